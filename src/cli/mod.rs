//! Terminal front end: argument parsing plus the interactive menu.

pub mod batch;
pub mod menu;
pub mod single;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::ProgressStyle;

/// Fetch YouTube audio/video through yt-dlp and ffmpeg.
#[derive(Debug, Parser)]
#[command(name = "tubefetch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Override the configured download directory
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive terminal menu (the default)
    Menu,

    /// Download a single URL
    Download {
        url: String,

        /// Output format: mp3 or mp4
        #[arg(long, default_value = "mp3")]
        mode: String,

        /// Audio bitrate in kbps: 128, 192 or 256
        #[arg(long, default_value = "192")]
        quality: String,

        /// Video resolution cap: 360, 720 or 1080
        #[arg(long, default_value = "720")]
        video_quality: String,
    },

    /// Download every URL in a batch file with bounded parallelism
    Batch {
        /// Plain text (one URL per line) or CSV file
        file: PathBuf,

        /// Output format: mp3 or mp4
        #[arg(long, default_value = "mp3")]
        mode: String,

        /// Audio bitrate in kbps: 128, 192 or 256
        #[arg(long, default_value = "192")]
        quality: String,

        /// Video resolution cap: 360, 720 or 1080
        #[arg(long, default_value = "720")]
        video_quality: String,

        /// Override the configured concurrent download limit
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Run the local web server
    Serve,

    /// Manage the local server lifecycle (start/stop/autostart)
    Launcher,
}

/// Shared progress bar look for single and batch downloads.
pub(crate) fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg:50!} [{bar:25.cyan/blue}] {percent:>3}%",
    )
    .expect("progress template")
    .progress_chars("=>-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_download_defaults() {
        let cli = Cli::parse_from(["tubefetch", "download", "https://youtu.be/abc"]);
        match cli.command {
            Some(Command::Download {
                url,
                mode,
                quality,
                video_quality,
            }) => {
                assert_eq!(url, "https://youtu.be/abc");
                assert_eq!(mode, "mp3");
                assert_eq!(quality, "192");
                assert_eq!(video_quality, "720");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_batch_concurrency_flag() {
        let cli = Cli::parse_from([
            "tubefetch",
            "batch",
            "batch.txt",
            "--mode",
            "mp4",
            "--concurrency",
            "5",
        ]);
        match cli.command {
            Some(Command::Batch {
                mode, concurrency, ..
            }) => {
                assert_eq!(mode, "mp4");
                assert_eq!(concurrency, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_output_dir() {
        let cli = Cli::parse_from(["tubefetch", "serve", "--output-dir", "/tmp/media"]);
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/media")));
    }
}
