//! Local server lifecycle control.
//!
//! Enforces the single-instance rules: the launcher starts at most one
//! in-process server, recognizes an externally started instance, and only
//! ever stops what it started itself.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::models::{AppError, AppResult};
use crate::launcher::health;
use crate::server;

/// How long `stop` waits for the server task to wind down.
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This controller already runs a live server.
    AlreadyRunning,
    /// Someone else is serving on the configured port; left untouched.
    ExternalDetected,
    /// A fresh in-process server was started.
    Started,
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The reachable instance was not started by this launcher.
    ExternalNotStopped,
    NothingToStop,
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<AppResult<()>>,
}

/// Start/stop state machine for the in-process server.
pub struct ServerController {
    config: AppConfig,
    running: Option<RunningServer>,
    started_by_launcher: bool,
}

impl ServerController {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            running: None,
            started_by_launcher: false,
        }
    }

    /// True while a launcher-started server task is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|server| !server.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn started_by_launcher(&self) -> bool {
        self.started_by_launcher
    }

    /// Ensure a server is available, starting one only when nothing answers
    /// on the configured port.
    pub async fn start(&mut self) -> AppResult<StartOutcome> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        if health::is_server_reachable(&self.config.server, health::PROBE_TIMEOUT).await {
            info!("🔎 External server detected on {}", self.config.server.base_url());
            self.started_by_launcher = false;
            return Ok(StartOutcome::ExternalDetected);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            server::serve_with_shutdown(config, async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        self.running = Some(RunningServer {
            shutdown: shutdown_tx,
            handle,
        });
        self.started_by_launcher = true;
        info!("🚀 Server started by launcher");
        Ok(StartOutcome::Started)
    }

    /// Stop the launcher-started server, waiting briefly for a clean exit.
    /// External instances are deliberately left running.
    pub async fn stop(&mut self) -> AppResult<StopOutcome> {
        if !self.started_by_launcher {
            if health::is_server_reachable(&self.config.server, health::PROBE_TIMEOUT).await {
                return Ok(StopOutcome::ExternalNotStopped);
            }
            return Ok(StopOutcome::NothingToStop);
        }

        let Some(server) = self.running.take() else {
            self.started_by_launcher = false;
            return Ok(StopOutcome::NothingToStop);
        };

        let _ = server.shutdown.send(());
        match tokio::time::timeout(STOP_TIMEOUT, server.handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Server exited with error: {}", e),
            Ok(Err(e)) => warn!("Server task join error: {}", e),
            Err(_) => {
                warn!("Server did not stop within {:?}", STOP_TIMEOUT);
                return Err(AppError::Server(
                    "Server did not stop in time".to_string(),
                ));
            }
        }

        self.started_by_launcher = false;
        info!("🛑 Server stopped by launcher");
        Ok(StopOutcome::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ServerConfig;

    fn free_port_config() -> AppConfig {
        // Bind an ephemeral port, then release it for the controller.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port,
            },
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_stop_cycle() {
        let config = free_port_config();
        let mut controller = ServerController::new(config.clone());

        assert!(!controller.is_running());
        assert_eq!(controller.start().await.unwrap(), StartOutcome::Started);
        assert!(controller.started_by_launcher());

        assert!(
            health::wait_until_ready(&config.server, Duration::from_secs(5)).await,
            "server never became healthy"
        );

        // A second start is a no-op while the first one lives.
        assert_eq!(
            controller.start().await.unwrap(),
            StartOutcome::AlreadyRunning
        );

        assert_eq!(controller.stop().await.unwrap(), StopOutcome::Stopped);
        assert!(!controller.is_running());
        assert!(!controller.started_by_launcher());
    }

    #[tokio::test]
    async fn test_external_instance_is_detected_and_never_stopped() {
        let config = free_port_config();

        // Simulate an externally started instance.
        let mut external = ServerController::new(config.clone());
        external.start().await.unwrap();
        assert!(health::wait_until_ready(&config.server, Duration::from_secs(5)).await);

        let mut controller = ServerController::new(config.clone());
        assert_eq!(
            controller.start().await.unwrap(),
            StartOutcome::ExternalDetected
        );
        assert!(!controller.started_by_launcher());

        // Stop refuses to touch what it did not start.
        assert_eq!(
            controller.stop().await.unwrap(),
            StopOutcome::ExternalNotStopped
        );
        assert!(health::is_server_reachable(&config.server, health::PROBE_TIMEOUT).await);

        external.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_noop() {
        let config = free_port_config();
        let mut controller = ServerController::new(config);
        assert_eq!(controller.stop().await.unwrap(), StopOutcome::NothingToStop);
    }
}
