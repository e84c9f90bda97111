//! The interactive terminal menu: pick a mode, pick a quality, download.

use std::path::Path;

use anyhow::Result;
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Input, Select};
use tokio::runtime::Runtime;

use crate::core::config::AppConfig;
use crate::core::ffmpeg;
use crate::core::models::{AudioBitrate, OutputKind};

use super::{batch, single};

/// Run the menu loop until the user picks Exit.
pub fn run(runtime: &Runtime, config: &AppConfig) -> Result<()> {
    let term = Term::stdout();

    let yt_dlp_missing = !runtime.block_on(ffmpeg::check_yt_dlp()).unwrap_or(false);

    loop {
        show_header(&term);
        if yt_dlp_missing {
            println!(
                "{}",
                style("Warning: yt-dlp was not found. Downloads will fail until it is installed.")
                    .yellow()
            );
            println!();
        }

        let mode = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Choose a mode")
            .items(&["Single URL", "Batch file (.txt)", "Exit"])
            .default(0)
            .interact()?;

        if mode == 2 {
            println!("{}", style("See you!").blue());
            return Ok(());
        }

        let quality = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Choose the audio quality")
            .items(&[
                "128 kbps (low)",
                "192 kbps (recommended)",
                "256 kbps (high)",
            ])
            .default(1)
            .interact()?;
        let bitrate = match quality {
            0 => AudioBitrate::Kbps128,
            2 => AudioBitrate::Kbps256,
            _ => AudioBitrate::Kbps192,
        };
        let kind = OutputKind::Mp3 { bitrate };

        if mode == 0 {
            let url: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Paste the YouTube video URL")
                .allow_empty(true)
                .interact_text()?;

            if !url.trim().is_empty() {
                match runtime.block_on(single::download_single(config, &url, kind)) {
                    Ok(file) => println!(
                        "{}",
                        style(format!("Saved to {}", file.display())).green()
                    ),
                    Err(e) => println!("{}", style(format!("Error: {}", e)).red()),
                }
                pause(&term)?;
            }
        } else {
            let path: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Path to the batch file")
                .default("batch.txt".to_string())
                .interact_text()?;

            // Strip quotes left over from shell drag-and-drop paste.
            let cleaned = path.replace(['"', '\''], "");
            let cleaned = cleaned.trim();

            if !cleaned.is_empty() {
                if let Err(e) =
                    runtime.block_on(batch::run_batch_file(config, Path::new(cleaned), kind, None))
                {
                    println!("{}", style(format!("Error: {}", e)).red());
                }
                pause(&term)?;
            }
        }
    }
}

fn show_header(term: &Term) {
    let _ = term.clear_screen();
    println!("{}", style("YouTube MP3 Downloader").cyan().bold());
    println!("{}", style("Download audio with quality and style!").dim());
    println!();
}

fn pause(term: &Term) -> Result<()> {
    println!();
    println!("{}", style("Press Enter to continue...").dim());
    term.read_line()?;
    Ok(())
}
