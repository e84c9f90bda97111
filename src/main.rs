use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tubefetch::cli::{self, Cli, Command};
use tubefetch::core::config::AppConfig;
use tubefetch::core::models::OutputKind;
use tubefetch::{launcher, server, utils};

fn main() -> Result<()> {
    utils::logging::init_tracing();

    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default();
    if let Some(dir) = &cli.output_dir {
        config.download.output_directory = dir.to_string_lossy().into_owned();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tubefetch-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => cli::menu::run(&runtime, &config),
        Command::Download {
            url,
            mode,
            quality,
            video_quality,
        } => {
            let kind = OutputKind::from_request(&mode, &quality, &video_quality);
            let file = runtime.block_on(cli::single::download_single(&config, &url, kind))?;
            println!("{}", file.display());
            Ok(())
        }
        Command::Batch {
            file,
            mode,
            quality,
            video_quality,
            concurrency,
        } => {
            let kind = OutputKind::from_request(&mode, &quality, &video_quality);
            let report =
                runtime.block_on(cli::batch::run_batch_file(&config, &file, kind, concurrency))?;
            if report.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Serve => {
            info!("🚀 Starting {} v{}", tubefetch::NAME, tubefetch::VERSION);
            runtime.block_on(server::serve(config))?;
            Ok(())
        }
        Command::Launcher => launcher::run(&runtime, config),
    }
}
