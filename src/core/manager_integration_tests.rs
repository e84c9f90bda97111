//! Batch orchestration integration tests.
//!
//! These drive the manager end to end against a fake yt-dlp executable
//! (a generated shell script), so the full spawn / progress / resolve path
//! runs without touching the network.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::config::DownloadConfig;
use crate::core::extractor::Extractor;
use crate::core::manager::{DownloadEvent, DownloadManager};
use crate::core::models::{OutputKind, TaskStatus};

/// Write an executable fake yt-dlp into `dir` and return its path.
///
/// The fake answers `--dump-json` probes, fails for URLs containing `fail`,
/// and otherwise emits progress lines and drops a file into the `-o` target
/// directory. `extra` is spliced in before the output file is produced.
fn write_fake_ytdlp(dir: &Path, extra: &str) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
url=""
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
  url="$a"
done
case "$*" in
  *--dump-json*)
    case "$url" in
      *fail*) echo "ERROR: Video unavailable" >&2; exit 1;;
    esac
    printf '{{"title":"Fake Video","uploader":"Fake Channel","duration":60}}\n'
    exit 0;;
esac
case "$url" in
  *fail*) echo "ERROR: Video unavailable" >&2; exit 1;;
esac
echo "[download]  50.0% of 1.00MiB at 512.00KiB/s ETA 00:01"
echo "[download] 100% of 1.00MiB in 00:01"
echo "[ExtractAudio] Destination: fake.mp3"
{extra}
dir=$(dirname "$out")
mkdir -p "$dir"
touch "$dir/fake-$$.mp3"
exit 0
"#
    );

    let path = dir.join("fake-yt-dlp");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn test_manager(
    fake_dir: &Path,
    output_dir: &Path,
    concurrent: usize,
    extra: &str,
) -> DownloadManager {
    let binary = write_fake_ytdlp(fake_dir, extra);
    let config = DownloadConfig {
        concurrent_downloads: concurrent,
        retry_attempts: 1,
        output_directory: output_dir.to_string_lossy().into_owned(),
        ..DownloadConfig::default()
    };

    let mut manager =
        DownloadManager::with_extractor(config, Extractor::with_binary(binary.to_string_lossy()))
            .unwrap();
    manager.set_ffmpeg_location(PathBuf::from("/usr/bin/ffmpeg"));
    manager
}

#[tokio::test]
async fn test_batch_isolates_per_item_failures() {
    let fake_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let manager = test_manager(fake_dir.path(), out_dir.path(), 2, "");

    manager
        .add_batch(vec![
            "https://youtu.be/okone".to_string(),
            "https://youtu.be/fail".to_string(),
            "https://youtu.be/oktwo".to_string(),
        ])
        .await;

    let report = manager.run_batch(OutputKind::default()).await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.cancelled, 0);

    let tasks = manager.tasks().await;
    let failed: Vec<_> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].url, "https://youtu.be/fail");
    assert!(failed[0].error_message.is_some());

    for task in tasks.iter().filter(|t| t.status == TaskStatus::Completed) {
        assert!(task.output_file.is_some());
        assert_eq!(task.title.as_deref(), Some("Fake Video"));
        assert!((task.progress - 100.0).abs() < f64::EPSILON);
    }
}

#[tokio::test]
async fn test_invalid_url_fails_without_spawning() {
    let fake_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let manager = test_manager(fake_dir.path(), out_dir.path(), 2, "");

    manager
        .add_batch(vec!["https://example.com/not-youtube".to_string()])
        .await;

    let report = manager.run_batch(OutputKind::default()).await.unwrap();
    assert_eq!(report.failed, 1);

    let task = &manager.tasks().await[0];
    assert!(task
        .error_message
        .as_deref()
        .unwrap()
        .contains("Invalid YouTube URL"));
}

#[tokio::test]
async fn test_concurrency_limit_of_one_runs_serially() {
    let fake_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let log = fake_dir.path().join("exec.log");
    let extra = format!(
        "echo start >> {log}\nsleep 0.3\necho end >> {log}",
        log = log.display()
    );
    let manager = test_manager(fake_dir.path(), out_dir.path(), 1, &extra);

    manager
        .add_batch(vec![
            "https://youtu.be/aaa".to_string(),
            "https://youtu.be/bbb".to_string(),
        ])
        .await;

    let report = manager.run_batch(OutputKind::default()).await.unwrap();
    assert_eq!(report.completed, 2);

    // With a single permit the start/end markers must never interleave.
    let content = std::fs::read_to_string(&log).unwrap();
    let markers: Vec<&str> = content.lines().collect();
    assert_eq!(markers, vec!["start", "end", "start", "end"]);
}

#[tokio::test]
async fn test_events_cover_the_item_lifecycle() {
    let fake_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let mut manager = test_manager(fake_dir.path(), out_dir.path(), 1, "");

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager.set_event_sender(tx);

    manager
        .add_batch(vec!["https://youtu.be/okone".to_string()])
        .await;
    manager.run_batch(OutputKind::default()).await.unwrap();

    let mut queued = 0;
    let mut started = 0;
    let mut progressed = 0;
    let mut converting = 0;
    let mut completed = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            DownloadEvent::TaskQueued { .. } => queued += 1,
            DownloadEvent::TaskStarted { title, .. } => {
                assert_eq!(title.as_deref(), Some("Fake Video"));
                started += 1;
            }
            DownloadEvent::TaskProgress { .. } => progressed += 1,
            DownloadEvent::TaskConverting { .. } => converting += 1,
            DownloadEvent::TaskCompleted { .. } => completed += 1,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    assert_eq!(queued, 1);
    assert_eq!(started, 1);
    assert!(progressed >= 2);
    assert_eq!(converting, 1);
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn test_cancel_all_aborts_in_flight_batch() {
    let fake_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(test_manager(fake_dir.path(), out_dir.path(), 1, "sleep 5"));

    manager
        .add_batch(vec![
            "https://youtu.be/aaa".to_string(),
            "https://youtu.be/bbb".to_string(),
        ])
        .await;

    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run_batch(OutputKind::default()).await })
    };

    // Give the first item time to reach its sleep before cancelling.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let cancelled = manager.cancel_all().await;
    assert!(cancelled >= 1);

    let report = runner.await.unwrap().unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.completed, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.cancelled, 2);
}
