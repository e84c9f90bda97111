//! Conversion binary discovery.
//!
//! The transcode itself is fully delegated: ffmpeg is only ever located here
//! and handed to the extractor via `--ffmpeg-location`.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::core::models::{AppError, AppResult};

/// Locate the ffmpeg binary.
///
/// On Windows a project-local `ffmpeg/ffmpeg.exe` next to the executable wins;
/// everywhere else (and as a Windows fallback) the PATH is searched.
pub fn locate_ffmpeg() -> AppResult<PathBuf> {
    if cfg!(windows) {
        if let Some(local) = project_local_ffmpeg() {
            return Ok(local);
        }
    }

    find_in_path(ffmpeg_binary_name()).ok_or_else(|| AppError::Ffmpeg(missing_ffmpeg_hint()))
}

fn ffmpeg_binary_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

fn project_local_ffmpeg() -> Option<PathBuf> {
    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let candidate = exe_dir.join("ffmpeg").join("ffmpeg.exe");
    candidate.is_file().then_some(candidate)
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Platform-specific installation hint shown when ffmpeg is missing.
pub fn missing_ffmpeg_hint() -> String {
    if cfg!(windows) {
        "FFmpeg not found. Add ffmpeg.exe to the project ffmpeg folder.".to_string()
    } else if cfg!(target_os = "macos") {
        "FFmpeg not found. Install it with brew install ffmpeg.".to_string()
    } else {
        "FFmpeg not found. Install it and add to PATH.".to_string()
    }
}

/// Run a tool with a probe argument and report whether it is usable.
async fn check_tool_availability(tool: &str, args: &[&str]) -> AppResult<bool> {
    match tokio::process::Command::new(tool).args(args).output().await {
        Ok(output) => Ok(output.status.success()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Check if ffmpeg is available
pub async fn check_ffmpeg() -> AppResult<bool> {
    info!("🎬 Checking FFmpeg availability");

    let available = check_tool_availability("ffmpeg", &["-version"]).await?;
    if available {
        info!("✅ FFmpeg is available");
    } else {
        warn!("⚠️ FFmpeg is not available");
    }
    Ok(available)
}

/// Check if yt-dlp is available
pub async fn check_yt_dlp() -> AppResult<bool> {
    info!("📺 Checking yt-dlp availability");

    let available = check_tool_availability("yt-dlp", &["--version"]).await?;
    if available {
        info!("✅ yt-dlp is available");
    } else {
        warn!("⚠️ yt-dlp is not available");
    }
    Ok(available)
}
