//! Single-URL download with a live progress bar.

use std::path::PathBuf;

use indicatif::ProgressBar;
use tokio::sync::mpsc;

use crate::core::config::AppConfig;
use crate::core::extractor::{is_youtube_url, Extractor, ExtractorEvent, ExtractorOptions};
use crate::core::ffmpeg;
use crate::core::models::{AppError, AppResult, OutputKind};

/// Download one URL into the configured directory and return the produced
/// file.
pub async fn download_single(config: &AppConfig, url: &str, kind: OutputKind) -> AppResult<PathBuf> {
    let url = url.trim();
    if !is_youtube_url(url) {
        return Err(AppError::InvalidUrl(url.to_string()));
    }

    // ffmpeg is required for both extraction and muxing; fail before
    // anything is spawned.
    let ffmpeg_location = ffmpeg::locate_ffmpeg()?;
    let output_dir = config
        .download_dir()
        .map_err(|e| AppError::Config(e.to_string()))?;

    let extractor = Extractor::new();
    let options = ExtractorOptions::new(
        kind,
        output_dir,
        ffmpeg_location,
        config.download.user_agent.clone(),
    );

    let bar = ProgressBar::new(100);
    bar.set_style(super::progress_style());
    bar.set_message("Starting...");
    bar.enable_steady_tick(std::time::Duration::from_millis(100));

    let title = match extractor.probe(url).await {
        Ok(preview) => preview.title,
        Err(e) => {
            bar.abandon_with_message(format!("Failed: {}", e));
            return Err(e);
        }
    };
    bar.set_message(format!("Downloading: {}", title));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let ui_bar = bar.clone();
    let ui_title = title.clone();
    let ui_kind = kind;
    let ui = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ExtractorEvent::Progress(update) => {
                    ui_bar.set_position(update.percent as u64);
                }
                ExtractorEvent::Converting => {
                    ui_bar.set_message(format!(
                        "Converting to {}: {}",
                        ui_kind.label(),
                        ui_title
                    ));
                }
            }
        }
    });

    let result = extractor.download(url, &options, Some(events_tx)).await;
    let _ = ui.await;

    match result {
        Ok(file) => {
            bar.set_position(100);
            bar.finish_with_message(format!("Completed: {}", title));
            Ok(file)
        }
        Err(e) => {
            bar.abandon_with_message(format!("Failed: {}", title));
            Err(e)
        }
    }
}
