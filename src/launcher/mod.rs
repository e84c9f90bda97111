//! Desktop launcher front end.
//!
//! A terminal take on the launcher window: shows server liveness, starts and
//! stops the local server, opens the web page and toggles autostart. The
//! tray/GUI toolkit itself stays external territory; the lifecycle manager is
//! what lives here.

pub mod autostart;
pub mod controller;
pub mod health;

use std::time::Duration;

use anyhow::Result;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use tokio::runtime::Runtime;

use crate::core::config::AppConfig;
use autostart::AutoStartManager;
use controller::{ServerController, StartOutcome, StopOutcome};

/// Short probe used when refreshing the status line between menu passes.
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Run the interactive launcher menu until the user exits.
pub fn run(runtime: &Runtime, config: AppConfig) -> Result<()> {
    let mut controller = ServerController::new(config.clone());
    let autostart = AutoStartManager::new();
    let base_url = config.server.base_url();

    loop {
        let reachable = runtime.block_on(health::is_server_reachable(
            &config.server,
            STATUS_PROBE_TIMEOUT,
        ));

        println!();
        println!(
            "{} {}",
            style("Tubefetch Launcher").cyan().bold(),
            style(format!("v{}", crate::VERSION)).dim()
        );
        println!("  {} {}", style("URL:").bold(), base_url);
        if reachable {
            let origin = if controller.started_by_launcher() {
                "started by this launcher"
            } else {
                "external instance"
            };
            println!(
                "  {} {} ({})",
                style("Status:").bold(),
                style("online").green(),
                origin
            );
        } else {
            println!("  {} {}", style("Status:").bold(), style("offline").red());
        }

        let autostart_label = if !AutoStartManager::supported() {
            "Autostart (not supported on this platform)"
        } else if autostart.is_enabled() {
            "Disable autostart"
        } else {
            "Enable autostart"
        };

        let items = [
            "Start server",
            "Open page",
            "Stop server",
            autostart_label,
            "Exit",
        ];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Launcher")
            .items(&items)
            .default(0)
            .interact()?;

        match selection {
            0 => start_server(runtime, &mut controller, &config, &base_url)?,
            1 => open_page(runtime, &mut controller, &config, &base_url)?,
            2 => stop_server(runtime, &mut controller)?,
            3 => toggle_autostart(&autostart),
            _ => {
                // Never tear down an external instance on exit.
                if controller.started_by_launcher() {
                    let _ = runtime.block_on(controller.stop());
                }
                println!("{}", style("Bye!").blue());
                return Ok(());
            }
        }
    }
}

fn startup_timeout(config: &AppConfig) -> Duration {
    Duration::from_secs(
        config
            .launcher
            .as_ref()
            .map(|l| l.startup_timeout_secs)
            .unwrap_or(8),
    )
}

fn open_browser_on_start(config: &AppConfig) -> bool {
    config
        .launcher
        .as_ref()
        .map(|l| l.open_browser_on_start)
        .unwrap_or(true)
}

fn start_server(
    runtime: &Runtime,
    controller: &mut ServerController,
    config: &AppConfig,
    base_url: &str,
) -> Result<()> {
    match runtime.block_on(controller.start())? {
        StartOutcome::AlreadyRunning | StartOutcome::ExternalDetected => {
            println!("{}", style("Server is already online").green());
            open_url(base_url);
            return Ok(());
        }
        StartOutcome::Started => {}
    }

    println!("{}", style("Starting server...").yellow());
    let ready = runtime.block_on(health::wait_until_ready(
        &config.server,
        startup_timeout(config),
    ));

    if ready {
        println!("{}", style("Server online").green());
        if open_browser_on_start(config) {
            open_url(base_url);
        }
    } else {
        println!(
            "{}",
            style(format!(
                "Could not start the local server on port {}",
                config.server.port
            ))
            .red()
        );
    }
    Ok(())
}

fn open_page(
    runtime: &Runtime,
    controller: &mut ServerController,
    config: &AppConfig,
    base_url: &str,
) -> Result<()> {
    let reachable = runtime.block_on(health::is_server_reachable(
        &config.server,
        health::PROBE_TIMEOUT,
    ));
    if reachable {
        open_url(base_url);
        return Ok(());
    }

    let start_now = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Server is offline. Start it now?")
        .default(true)
        .interact()?;
    if start_now {
        start_server(runtime, controller, config, base_url)?;
    }
    Ok(())
}

fn stop_server(runtime: &Runtime, controller: &mut ServerController) -> Result<()> {
    match runtime.block_on(controller.stop())? {
        StopOutcome::Stopped => println!("{}", style("Server stopped").red()),
        StopOutcome::ExternalNotStopped => println!(
            "{}",
            style("External server in use (not stopped)").yellow()
        ),
        StopOutcome::NothingToStop => {
            println!("{}", style("No server started by the launcher").dim())
        }
    }
    Ok(())
}

fn toggle_autostart(autostart: &AutoStartManager) {
    if !AutoStartManager::supported() {
        println!(
            "{}",
            style("Autostart is not supported on this platform.").yellow()
        );
        return;
    }

    let result = if autostart.is_enabled() {
        autostart.disable()
    } else {
        autostart.enable()
    };

    match result {
        Ok(message) => println!("{}", style(message).green()),
        Err(e) => println!("{}", style(format!("Autostart update failed: {}", e)).red()),
    }
}

fn open_url(url: &str) {
    if let Err(e) = open::that(url) {
        println!("{}", style(format!("Failed to open browser: {}", e)).red());
    }
}
