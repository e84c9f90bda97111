//! yt-dlp orchestration.
//!
//! All extraction is delegated to the external `yt-dlp` binary: this module
//! builds its argument list, spawns it, parses its `--newline` progress
//! output, and resolves the file it produced. Transcoding is delegated as
//! well: ffmpeg is only passed through via `--ffmpeg-location`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::core::models::{AppError, AppResult, MediaPreview, OutputKind, ProgressUpdate};
use crate::core::progress::{format_duration, parse_progress_line, sanitize_error_message};

/// Hosts accepted as YouTube URLs.
const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "www.youtu.be",
];

/// Stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 200;

/// Validate that a URL is http(s) and points at a known YouTube host.
pub fn is_youtube_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw.trim()) else {
        return false;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    match parsed.host_str() {
        Some(host) => {
            let host = host.to_lowercase();
            YOUTUBE_HOSTS.iter().any(|h| *h == host)
        }
        None => false,
    }
}

/// Events emitted while a download runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorEvent {
    /// A `[download]` progress line was parsed.
    Progress(ProgressUpdate),
    /// The stream is downloaded and post-processing (audio extraction or
    /// stream merging) has started.
    Converting,
}

/// Options for a single extraction run.
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub kind: OutputKind,
    pub output_dir: PathBuf,
    pub ffmpeg_location: PathBuf,
    pub user_agent: String,
}

impl ExtractorOptions {
    pub fn new(
        kind: OutputKind,
        output_dir: impl Into<PathBuf>,
        ffmpeg_location: impl Into<PathBuf>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            output_dir: output_dir.into(),
            ffmpeg_location: ffmpeg_location.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Thin wrapper around the yt-dlp executable.
#[derive(Debug, Clone)]
pub struct Extractor {
    binary: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }

    /// Override the executable name, mainly for tests.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Fetch preview metadata without downloading anything.
    pub async fn probe(&self, url: &str) -> AppResult<MediaPreview> {
        if !is_youtube_url(url) {
            return Err(AppError::InvalidUrl(url.to_string()));
        }

        debug!("🔍 Probing metadata for: {}", url);

        let output = Command::new(&self.binary)
            .args([
                "--dump-json",
                "--no-warnings",
                "--no-playlist",
                "--skip-download",
                url,
            ])
            .output()
            .await
            .map_err(|e| AppError::Extractor(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Extractor(sanitize_error_message(&stderr)));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::Extractor(format!("Failed to parse yt-dlp output: {}", e)))?;

        Ok(parse_preview(&json))
    }

    /// Download one URL into `options.output_dir` and return the produced
    /// file.
    ///
    /// Runs at most two attempts: the plain option set first, then once more
    /// with the `android,web` player clients, since some videos only resolve
    /// through the alternate clients.
    pub async fn download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        events: Option<mpsc::UnboundedSender<ExtractorEvent>>,
    ) -> AppResult<PathBuf> {
        if !is_youtube_url(url) {
            return Err(AppError::InvalidUrl(url.to_string()));
        }

        tokio::fs::create_dir_all(&options.output_dir).await?;

        let mut last_error = None;
        for fallback in [false, true] {
            let args = build_args(url, options, fallback);
            debug!("yt-dlp args (fallback={}): {:?}", fallback, args);

            match self.run_once(&args, events.as_ref()).await {
                Ok(()) => {
                    let file = resolve_output_file(&options.output_dir)?;
                    info!("✅ Download finished: {}", file.display());
                    return Ok(file);
                }
                Err(e) => {
                    warn!(
                        "Extraction attempt failed (fallback={}): {}",
                        fallback, e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Extractor("yt-dlp produced no attempts".to_string())))
    }

    async fn run_once(
        &self,
        args: &[String],
        events: Option<&mpsc::UnboundedSender<ExtractorEvent>>,
    ) -> AppResult<()> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A cancelled batch item must not leave its extractor running.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Extractor(format!("Failed to spawn yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Extractor("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Extractor("yt-dlp stderr unavailable".to_string()))?;

        // Keep a bounded tail of stderr for the error message.
        let stderr_task = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("yt-dlp stderr: {}", line);
                if tail.len() >= STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut stdout_lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = stdout_lines.next_line().await {
            debug!("yt-dlp stdout: {}", line);
            if let Some(events) = events {
                if let Some(update) = parse_progress_line(&line) {
                    let _ = events.send(ExtractorEvent::Progress(update));
                } else if line.starts_with("[ExtractAudio]") || line.starts_with("[Merger]") {
                    let _ = events.send(ExtractorEvent::Converting);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::Extractor(format!("yt-dlp process failed: {}", e)))?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            let detail = if stderr_tail.is_empty() {
                format!("yt-dlp exited with {}", status)
            } else {
                sanitize_error_message(&stderr_tail)
            };
            Err(AppError::Extractor(detail))
        }
    }
}

/// Build the yt-dlp argument list for one attempt.
fn build_args(url: &str, options: &ExtractorOptions, fallback: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--no-warnings".into(),
        "--no-playlist".into(),
        "--retries".into(),
        "3".into(),
        "--fragment-retries".into(),
        "3".into(),
        "--skip-unavailable-fragments".into(),
        "--geo-bypass".into(),
        "--user-agent".into(),
        options.user_agent.clone(),
        "--ffmpeg-location".into(),
        options.ffmpeg_location.to_string_lossy().into_owned(),
        "-o".into(),
        options
            .output_dir
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned(),
    ];

    match options.kind {
        OutputKind::Mp3 { bitrate } => {
            args.extend([
                "--extract-audio".into(),
                "--audio-format".into(),
                "mp3".into(),
                "--audio-quality".into(),
                bitrate.as_arg().into(),
            ]);
        }
        OutputKind::Mp4 { resolution } => {
            let height = resolution.height();
            args.extend([
                "-f".into(),
                format!(
                    "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best[height<={h}]",
                    h = height
                ),
                "--merge-output-format".into(),
                "mp4".into(),
            ]);
        }
    }

    if fallback {
        args.extend([
            "--extractor-args".into(),
            "youtube:player_client=android,web".into(),
        ]);
    }

    args.push(url.to_string());
    args
}

/// Map a `--dump-json` document onto the preview shape.
fn parse_preview(json: &serde_json::Value) -> MediaPreview {
    MediaPreview {
        title: json["title"]
            .as_str()
            .unwrap_or("Unknown title")
            .to_string(),
        channel: json["uploader"]
            .as_str()
            .unwrap_or("Unknown channel")
            .to_string(),
        duration: format_duration(json["duration"].as_u64()),
        thumbnail: json["thumbnail"].as_str().map(str::to_string),
    }
}

/// Newest regular file in the output directory. yt-dlp writes under the
/// title template, so the freshest file is the one this run produced.
pub fn resolve_output_file(dir: &Path) -> AppResult<PathBuf> {
    let newest = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            // Skip in-flight artifacts.
            !matches!(
                entry.path().extension().and_then(|e| e.to_str()),
                Some("part") | Some("ytdl") | Some("temp")
            )
        })
        .max_by_key(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        });

    newest
        .map(|entry| entry.into_path())
        .ok_or_else(|| AppError::Extractor("Download failed to produce a file.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{AudioBitrate, VideoResolution};

    fn test_options(kind: OutputKind) -> ExtractorOptions {
        ExtractorOptions::new(kind, "/tmp/out", "/usr/bin/ffmpeg", "TestAgent/1.0")
    }

    #[test]
    fn test_is_youtube_url() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://m.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("http://music.youtube.com/watch?v=x"));
        assert!(is_youtube_url("  https://youtu.be/abc  "));

        assert!(!is_youtube_url("https://example.com/video"));
        assert!(!is_youtube_url("ftp://youtube.com/watch?v=x"));
        assert!(!is_youtube_url("https://notyoutube.com/watch"));
        assert!(!is_youtube_url("https://evil.youtube.com.example.com/"));
        assert!(!is_youtube_url("not a url"));
    }

    #[test]
    fn test_build_args_mp3() {
        let options = test_options(OutputKind::Mp3 {
            bitrate: AudioBitrate::Kbps256,
        });
        let args = build_args("https://youtu.be/abc", &options, false);

        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"256K".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--newline".to_string()));
        assert!(!args.iter().any(|a| a == "--extractor-args"));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_build_args_mp4_height_cap() {
        let options = test_options(OutputKind::Mp4 {
            resolution: VideoResolution::P1080,
        });
        let args = build_args("https://youtu.be/abc", &options, false);

        let format = args
            .iter()
            .position(|a| a == "-f")
            .map(|i| args[i + 1].clone())
            .unwrap();
        assert!(format.contains("height<=1080"));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(args.contains(&"mp4".to_string()));
    }

    #[test]
    fn test_build_args_fallback_adds_player_clients() {
        let options = test_options(OutputKind::default());
        let args = build_args("https://youtu.be/abc", &options, true);

        let pos = args.iter().position(|a| a == "--extractor-args").unwrap();
        assert_eq!(args[pos + 1], "youtube:player_client=android,web");
        // URL stays last even with the fallback args appended.
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_parse_preview_full_and_missing_fields() {
        let json = serde_json::json!({
            "title": "Some Song",
            "uploader": "Some Channel",
            "duration": 245,
            "thumbnail": "https://i.ytimg.com/vi/x/hq720.jpg"
        });
        let preview = parse_preview(&json);
        assert_eq!(preview.title, "Some Song");
        assert_eq!(preview.channel, "Some Channel");
        assert_eq!(preview.duration, "4:05");
        assert!(preview.thumbnail.is_some());

        let preview = parse_preview(&serde_json::json!({}));
        assert_eq!(preview.title, "Unknown title");
        assert_eq!(preview.channel, "Unknown channel");
        assert_eq!(preview.duration, "--:--");
        assert!(preview.thumbnail.is_none());
    }

    #[test]
    fn test_resolve_output_file_picks_newest_and_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("first.mp3");
        let newer = dir.path().join("second.mp3");
        let partial = dir.path().join("third.mp4.part");

        std::fs::write(&older, b"a").unwrap();
        std::fs::write(&newer, b"b").unwrap();
        std::fs::write(&partial, b"c").unwrap();

        // Ensure distinct mtimes regardless of filesystem resolution.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        let file = std::fs::File::options().write(true).open(&newer).unwrap();
        file.set_modified(later).unwrap();

        let resolved = resolve_output_file(dir.path()).unwrap();
        assert_eq!(resolved, newer);
    }

    #[test]
    fn test_resolve_output_file_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_output_file(dir.path()).is_err());
    }
}
