//! Login-item registration for the launcher.
//!
//! Follows the repository's stance of orchestrating platform tools instead of
//! binding them: `reg.exe` manages the Windows Run key, `launchctl` loads the
//! macOS LaunchAgent plist. Other platforms report autostart as unsupported.

use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::core::models::{AppError, AppResult};

const LAUNCHER_NAME: &str = "tubefetch";

#[cfg(windows)]
const RUN_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run";

/// Manage "start with the system" registration for the launcher.
pub struct AutoStartManager;

impl Default for AutoStartManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoStartManager {
    pub fn new() -> Self {
        Self
    }

    pub fn supported() -> bool {
        cfg!(windows) || cfg!(target_os = "macos")
    }

    /// The command registered for login start: this executable in launcher
    /// mode.
    fn command_parts() -> AppResult<Vec<String>> {
        let exe = std::env::current_exe()
            .map_err(|e| AppError::Config(format!("Failed to resolve executable path: {}", e)))?;
        Ok(vec![exe.to_string_lossy().into_owned(), "launcher".to_string()])
    }

    pub fn is_enabled(&self) -> bool {
        if cfg!(windows) {
            self.is_enabled_windows()
        } else if cfg!(target_os = "macos") {
            mac_plist_path().map(|path| path.exists()).unwrap_or(false)
        } else {
            false
        }
    }

    /// Returns a user-facing confirmation message on success.
    pub fn enable(&self) -> AppResult<String> {
        if cfg!(windows) {
            self.enable_windows()
        } else if cfg!(target_os = "macos") {
            self.enable_macos()
        } else {
            Err(AppError::Config(
                "Autostart is not supported on this platform.".to_string(),
            ))
        }
    }

    pub fn disable(&self) -> AppResult<String> {
        if cfg!(windows) {
            self.disable_windows()
        } else if cfg!(target_os = "macos") {
            self.disable_macos()
        } else {
            Err(AppError::Config(
                "Autostart is not supported on this platform.".to_string(),
            ))
        }
    }

    #[cfg(windows)]
    fn is_enabled_windows(&self) -> bool {
        Command::new("reg")
            .args(["query", RUN_KEY, "/v", LAUNCHER_NAME])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    #[cfg(not(windows))]
    fn is_enabled_windows(&self) -> bool {
        false
    }

    #[cfg(windows)]
    fn enable_windows(&self) -> AppResult<String> {
        let command = windows_command(&Self::command_parts()?);
        let output = Command::new("reg")
            .args([
                "add", RUN_KEY, "/v", LAUNCHER_NAME, "/t", "REG_SZ", "/d", &command, "/f",
            ])
            .output()
            .map_err(|e| AppError::Config(format!("Failed to run reg.exe: {}", e)))?;

        if output.status.success() {
            info!("Enabled Windows autostart");
            Ok("Autostart enabled.".to_string())
        } else {
            Err(AppError::Config(format!(
                "Failed to enable autostart: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    #[cfg(not(windows))]
    fn enable_windows(&self) -> AppResult<String> {
        unreachable!("windows-only path")
    }

    #[cfg(windows)]
    fn disable_windows(&self) -> AppResult<String> {
        let output = Command::new("reg")
            .args(["delete", RUN_KEY, "/v", LAUNCHER_NAME, "/f"])
            .output()
            .map_err(|e| AppError::Config(format!("Failed to run reg.exe: {}", e)))?;

        // A missing value means it was already disabled.
        info!("Disabled Windows autostart (status: {})", output.status);
        Ok("Autostart disabled.".to_string())
    }

    #[cfg(not(windows))]
    fn disable_windows(&self) -> AppResult<String> {
        unreachable!("windows-only path")
    }

    fn enable_macos(&self) -> AppResult<String> {
        let plist_path = mac_plist_path()?;
        if let Some(parent) = plist_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = plist_content(&Self::command_parts()?);
        std::fs::write(&plist_path, content)?;

        // launchctl failures are non-fatal: the agent still loads on the
        // next login.
        let _ = Command::new("launchctl")
            .args(["unload", &plist_path.to_string_lossy()])
            .output();
        let _ = Command::new("launchctl")
            .args(["load", &plist_path.to_string_lossy()])
            .output();

        info!("Enabled macOS autostart via {}", plist_path.display());
        Ok("Autostart enabled.".to_string())
    }

    fn disable_macos(&self) -> AppResult<String> {
        let plist_path = mac_plist_path()?;
        let _ = Command::new("launchctl")
            .args(["unload", &plist_path.to_string_lossy()])
            .output();

        if plist_path.exists() {
            std::fs::remove_file(&plist_path)?;
            info!("Disabled macOS autostart");
            Ok("Autostart disabled.".to_string())
        } else {
            Ok("Autostart was already disabled.".to_string())
        }
    }
}

fn mac_plist_path() -> AppResult<PathBuf> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| AppError::Config("HOME is not set".to_string()))?;
    Ok(PathBuf::from(home)
        .join("Library")
        .join("LaunchAgents")
        .join(format!("com.{}.plist", LAUNCHER_NAME)))
}

#[cfg(windows)]
fn windows_command(parts: &[String]) -> String {
    parts
        .iter()
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join(" ")
}

fn plist_content(parts: &[String]) -> String {
    let args = parts
        .iter()
        .map(|part| format!("        <string>{}</string>", part))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>com.{name}</string>
    <key>ProgramArguments</key>
    <array>
{args}
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
</dict>
</plist>
"#,
        name = LAUNCHER_NAME,
        args = args
    )
}
