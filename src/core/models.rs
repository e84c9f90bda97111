//! Core data models shared by the terminal, web and launcher front ends

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Task status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Downloading,
    Converting,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Audio bitrates accepted for MP3 extraction. Anything else normalizes to
/// 192 kbps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioBitrate {
    Kbps128,
    Kbps192,
    Kbps256,
}

impl Default for AudioBitrate {
    fn default() -> Self {
        AudioBitrate::Kbps192
    }
}

impl AudioBitrate {
    pub fn normalize(value: &str) -> Self {
        match value.trim() {
            "128" => AudioBitrate::Kbps128,
            "256" => AudioBitrate::Kbps256,
            _ => AudioBitrate::Kbps192,
        }
    }

    /// Value passed to the extractor as `--audio-quality`.
    pub fn as_arg(&self) -> &'static str {
        match self {
            AudioBitrate::Kbps128 => "128K",
            AudioBitrate::Kbps192 => "192K",
            AudioBitrate::Kbps256 => "256K",
        }
    }

    pub fn kbps(&self) -> u32 {
        match self {
            AudioBitrate::Kbps128 => 128,
            AudioBitrate::Kbps192 => 192,
            AudioBitrate::Kbps256 => 256,
        }
    }
}

/// Video resolution caps accepted for MP4 downloads. Anything else normalizes
/// to 720p.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VideoResolution {
    P360,
    P720,
    P1080,
}

impl Default for VideoResolution {
    fn default() -> Self {
        VideoResolution::P720
    }
}

impl VideoResolution {
    pub fn normalize(value: &str) -> Self {
        match value.trim() {
            "360" => VideoResolution::P360,
            "1080" => VideoResolution::P1080,
            _ => VideoResolution::P720,
        }
    }

    /// Height cap used in the extractor format selector.
    pub fn height(&self) -> u32 {
        match self {
            VideoResolution::P360 => 360,
            VideoResolution::P720 => 720,
            VideoResolution::P1080 => 1080,
        }
    }
}

/// Requested output: MP3 audio extraction or MP4 video download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum OutputKind {
    Mp3 { bitrate: AudioBitrate },
    Mp4 { resolution: VideoResolution },
}

impl Default for OutputKind {
    fn default() -> Self {
        OutputKind::Mp3 {
            bitrate: AudioBitrate::default(),
        }
    }
}

impl OutputKind {
    /// Normalize loose form input the way the web API does: unknown modes
    /// fall back to mp3, unknown qualities to their defaults.
    pub fn from_request(mode: &str, quality: &str, video_quality: &str) -> Self {
        if mode.trim().eq_ignore_ascii_case("mp4") {
            OutputKind::Mp4 {
                resolution: VideoResolution::normalize(video_quality),
            }
        } else {
            OutputKind::Mp3 {
                bitrate: AudioBitrate::normalize(quality),
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutputKind::Mp3 { .. } => "mp3",
            OutputKind::Mp4 { .. } => "mp4",
        }
    }
}

/// One item of a batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,
    pub url: String,
    /// Resolved title, filled in once the probe succeeds.
    pub title: Option<String>,
    pub status: TaskStatus,
    pub progress: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub output_file: Option<PathBuf>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DownloadTask {
    pub fn new(url: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            title: None,
            status: TaskStatus::Pending,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: None,
            speed: None,
            eta_seconds: None,
            output_file: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Progress update information forwarded from the extractor process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    pub eta_seconds: Option<u64>,
}

/// Metadata shown before a download is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPreview {
    pub title: String,
    pub channel: String,
    /// Pre-formatted as `H:MM:SS` / `M:SS`, `--:--` when unknown.
    pub duration: String,
    pub thumbnail: Option<String>,
}

/// Aggregate outcome of a batch job. Every registered task ends up in exactly
/// one bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Extractor error: {0}")]
    Extractor(String),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("Batch error: {0}")]
    Batch(String),
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_normalization() {
        assert_eq!(AudioBitrate::normalize("128"), AudioBitrate::Kbps128);
        assert_eq!(AudioBitrate::normalize("256"), AudioBitrate::Kbps256);
        assert_eq!(AudioBitrate::normalize("192"), AudioBitrate::Kbps192);
        assert_eq!(AudioBitrate::normalize("999"), AudioBitrate::Kbps192);
        assert_eq!(AudioBitrate::normalize(""), AudioBitrate::Kbps192);
    }

    #[test]
    fn test_resolution_normalization() {
        assert_eq!(VideoResolution::normalize("360"), VideoResolution::P360);
        assert_eq!(VideoResolution::normalize("1080"), VideoResolution::P1080);
        assert_eq!(VideoResolution::normalize("4320"), VideoResolution::P720);
    }

    #[test]
    fn test_output_kind_from_request() {
        assert_eq!(
            OutputKind::from_request("mp4", "192", "1080"),
            OutputKind::Mp4 {
                resolution: VideoResolution::P1080
            }
        );
        assert_eq!(
            OutputKind::from_request("mp3", "256", "720"),
            OutputKind::Mp3 {
                bitrate: AudioBitrate::Kbps256
            }
        );
        // Unknown modes fall back to mp3.
        assert_eq!(
            OutputKind::from_request("flac", "128", "720"),
            OutputKind::Mp3 {
                bitrate: AudioBitrate::Kbps128
            }
        );
    }

    #[test]
    fn test_task_starts_pending() {
        let task = DownloadTask::new("https://youtu.be/abc".to_string());
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.status.is_terminal());
        assert!(task.error_message.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Downloading.is_terminal());
        assert!(!TaskStatus::Converting.is_terminal());
    }
}
