//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub download: DownloadConfig,
    pub server: ServerConfig,
    pub launcher: Option<LauncherConfig>,
}

/// Download-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Upper bound on simultaneously running batch items
    pub concurrent_downloads: usize,
    /// In-process retries for spawn-level failures (the extractor keeps its
    /// own `--retries` for network hiccups)
    pub retry_attempts: usize,
    pub user_agent: String,
    pub output_directory: String,
}

/// Local web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Launcher behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub open_browser_on_start: bool,
    /// Seconds to wait for the server to report healthy after a start
    pub startup_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            server: ServerConfig::default(),
            launcher: Some(LauncherConfig::default()),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: 3,
            retry_attempts: 3,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36"
                .to_string(),
            output_directory: "downloads".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            open_browser_on_start: true,
            startup_timeout_secs: 8,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url())
    }
}

impl AppConfig {
    /// Load configuration from file, creating default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: AppConfig =
                serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

            tracing::info!("Loaded configuration from: {:?}", config_path);
            Ok(config)
        } else {
            let config = Self::default();
            config.save()?;
            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load the persisted configuration, falling back to (and re-saving)
    /// defaults when the file is missing or invalid.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => {
                if let Err(err) = cfg.validate() {
                    tracing::warn!(
                        "Invalid configuration detected ({}), falling back to defaults",
                        err
                    );
                    let default_cfg = Self::default();
                    if let Err(save_err) = default_cfg.save() {
                        tracing::warn!("Failed to persist default configuration: {}", save_err);
                    }
                    default_cfg
                } else {
                    cfg
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to load configuration from disk: {}. Using defaults",
                    err
                );
                let default_cfg = Self::default();
                if let Err(save_err) = default_cfg.save() {
                    tracing::warn!("Failed to persist default configuration: {}", save_err);
                }
                default_cfg
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved configuration to: {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "tubefetch", "tubefetch")
            .with_context(|| "Failed to get project directories")?;

        let config_dir = project_dirs.config_dir();
        Ok(config_dir.join("config.json"))
    }

    /// Resolve the download directory, creating it if needed.
    pub fn download_dir(&self) -> Result<PathBuf> {
        let dir = PathBuf::from(&self.download.output_directory);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create download directory: {:?}", dir))?;
        Ok(dir)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.download.concurrent_downloads == 0 {
            anyhow::bail!("Concurrent downloads must be greater than 0");
        }

        if self.download.concurrent_downloads > 10 {
            anyhow::bail!("Concurrent downloads should not exceed 10");
        }

        if self.download.retry_attempts > 10 {
            anyhow::bail!("Retry attempts should not exceed 10");
        }

        if self.download.output_directory.trim().is_empty() {
            anyhow::bail!("Output directory must not be empty");
        }

        if self.server.host.trim().is_empty() {
            anyhow::bail!("Server host must not be empty");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be between 1 and 65535");
        }

        if let Some(ref launcher) = self.launcher {
            if launcher.startup_timeout_secs == 0 || launcher.startup_timeout_secs > 120 {
                anyhow::bail!("Launcher startup timeout should be between 1 and 120 seconds");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            parsed.download.concurrent_downloads,
            config.download.concurrent_downloads
        );
        assert_eq!(parsed.server.port, config.server.port);
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = AppConfig::default();

        config.download.concurrent_downloads = 0;
        assert!(config.validate().is_err());

        config.download.concurrent_downloads = 25;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.download.output_directory = "  ".to_string();
        assert!(config.validate().is_err());

        config = AppConfig::default();
        if let Some(ref mut launcher) = config.launcher {
            launcher.startup_timeout_secs = 0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_urls() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_address(), "127.0.0.1:8000");
        assert_eq!(server.base_url(), "http://127.0.0.1:8000");
        assert_eq!(server.health_url(), "http://127.0.0.1:8000/health");
    }
}
