//! Batch download front end: one progress bar per URL, all visible before
//! anything starts.

use std::collections::HashMap;
use std::path::Path;

use console::style;
use indicatif::{MultiProgress, ProgressBar};
use tokio::sync::mpsc;

use crate::core::batch_file;
use crate::core::config::AppConfig;
use crate::core::manager::{DownloadEvent, DownloadManager, EventReceiver};
use crate::core::models::{AppResult, BatchReport, OutputKind};

/// Parse a batch file and run every URL through the bounded orchestrator.
pub async fn run_batch_file(
    config: &AppConfig,
    file: &Path,
    kind: OutputKind,
    concurrency: Option<usize>,
) -> AppResult<BatchReport> {
    let urls = batch_file::parse_batch_file(file)?;

    println!(
        "\n{}\n",
        style(format!("Starting download of {} videos...", urls.len()))
            .green()
            .bold()
    );

    let mut download_config = config.download.clone();
    if let Some(limit) = concurrency {
        download_config.concurrent_downloads = limit.clamp(1, 10);
    }

    let mut manager = DownloadManager::new(download_config)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    manager.set_event_sender(events_tx);

    let tasks = manager.add_batch(urls).await;

    // Every item gets its bar up front so the whole job is visible at once.
    let multi = MultiProgress::new();
    let mut bars = HashMap::new();
    for task in &tasks {
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(super::progress_style());
        bar.set_message(format!("Waiting: {}", task.url));
        bars.insert(task.id.clone(), bar);
    }

    let ui = tokio::spawn(drive_bars(events_rx, bars));

    let report = manager.run_batch(kind).await?;

    // Dropping the manager closes the event channel and lets the UI task
    // drain and exit.
    drop(manager);
    let _ = ui.await;

    if report.failed == 0 && report.cancelled == 0 {
        println!(
            "\n{}",
            style("All downloads finished!").green().bold()
        );
    } else {
        println!(
            "\n{}",
            style(format!(
                "Finished: {} ok, {} failed, {} cancelled",
                report.completed, report.failed, report.cancelled
            ))
            .yellow()
            .bold()
        );
    }

    Ok(report)
}

/// Mirror manager events onto the per-task progress bars.
async fn drive_bars(mut events: EventReceiver, bars: HashMap<String, ProgressBar>) {
    let mut titles: HashMap<String, String> = HashMap::new();

    while let Some(event) = events.recv().await {
        let Some(bar) = bars.get(event.task_id()) else {
            continue;
        };

        match event {
            DownloadEvent::TaskQueued { .. } => {}
            DownloadEvent::TaskStarted { task_id, title } => {
                let title = title.unwrap_or_else(|| "Unknown title".to_string());
                bar.set_message(format!("Downloading: {}", title));
                titles.insert(task_id, title);
            }
            DownloadEvent::TaskProgress { update, .. } => {
                bar.set_position(update.percent as u64);
            }
            DownloadEvent::TaskConverting { task_id } => {
                let title = titles.get(&task_id).cloned().unwrap_or_default();
                bar.set_message(format!("Converting: {}", title));
            }
            DownloadEvent::TaskCompleted { task_id, .. } => {
                let title = titles.get(&task_id).cloned().unwrap_or_default();
                bar.set_position(100);
                bar.finish_with_message(format!("Completed: {}", title));
            }
            DownloadEvent::TaskFailed { error, .. } => {
                bar.abandon_with_message(format!("Failed: {}", error));
            }
            DownloadEvent::TaskCancelled { .. } => {
                bar.abandon_with_message("Cancelled".to_string());
            }
        }
    }
}
