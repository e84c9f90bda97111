//! Server liveness probing.

use std::time::Duration;

use crate::core::config::ServerConfig;

/// Per-probe timeout used by the launcher.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1200);

/// Poll cadence while waiting for a fresh server to come up.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// True when `/health` answers with a success status within the timeout.
pub async fn is_server_reachable(server: &ServerConfig, timeout: Duration) -> bool {
    let Ok(client) = reqwest::Client::builder().timeout(timeout).build() else {
        return false;
    };

    match client.get(server.health_url()).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Poll until the server reports healthy or the overall deadline passes.
pub async fn wait_until_ready(server: &ServerConfig, overall_timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + overall_timeout;
    while tokio::time::Instant::now() < deadline {
        if is_server_reachable(server, PROBE_TIMEOUT).await {
            return true;
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
    false
}
