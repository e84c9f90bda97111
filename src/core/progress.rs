//! Parsing of extractor progress lines and human-readable formatting.
//!
//! yt-dlp is spawned with `--newline`, which turns its progress display into
//! one parseable line per update:
//!
//! ```text
//! [download]  42.1% of 10.50MiB at 1.23MiB/s ETA 00:05
//! ```

use regex::Regex;
use std::sync::OnceLock;

use crate::core::models::ProgressUpdate;

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%\s+of\s+~?\s*(?P<size>\d+(?:\.\d+)?)(?P<size_unit>[KMGT]?i?B)(?:\s+at\s+(?P<speed>\d+(?:\.\d+)?)(?P<speed_unit>[KMGT]?i?B)/s)?(?:\s+ETA\s+(?P<eta>[\d:]+))?",
        )
        .expect("progress regex")
    })
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("ansi regex"))
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "B" => 1.0,
        "KiB" | "KB" => 1024.0,
        "MiB" | "MB" => 1024.0 * 1024.0,
        "GiB" | "GB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" | "TB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

/// Parse one `--newline` progress line. Returns `None` for anything that is
/// not a `[download]` percentage line (merger output, warnings, etc).
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let caps = progress_re().captures(line)?;

    let percent: f64 = caps.name("pct")?.as_str().parse().ok()?;
    let size: f64 = caps.name("size")?.as_str().parse().ok()?;
    let total = (size * unit_multiplier(caps.name("size_unit")?.as_str())) as u64;

    let speed = match (caps.name("speed"), caps.name("speed_unit")) {
        (Some(value), Some(unit)) => value
            .as_str()
            .parse::<f64>()
            .ok()
            .map(|v| v * unit_multiplier(unit.as_str())),
        _ => None,
    };

    let eta_seconds = caps.name("eta").and_then(|m| parse_clock(m.as_str()));

    Some(ProgressUpdate {
        percent,
        downloaded_bytes: (total as f64 * percent / 100.0) as u64,
        total_bytes: Some(total),
        speed,
        eta_seconds,
    })
}

/// Parse `MM:SS` / `H:MM:SS` clock strings into seconds.
pub fn parse_clock(clock: &str) -> Option<u64> {
    let mut seconds: u64 = 0;
    for part in clock.split(':') {
        seconds = seconds.checked_mul(60)?.checked_add(part.parse().ok()?)?;
    }
    Some(seconds)
}

/// Format a duration the way the preview endpoint reports it: `M:SS`,
/// `H:MM:SS`, or `--:--` when unknown.
pub fn format_duration(seconds: Option<u64>) -> String {
    match seconds {
        Some(total) if total > 0 => {
            let hours = total / 3600;
            let minutes = (total % 3600) / 60;
            let secs = total % 60;
            if hours > 0 {
                format!("{}:{:02}:{:02}", hours, minutes, secs)
            } else {
                format!("{}:{:02}", minutes, secs)
            }
        }
        _ => "--:--".to_string(),
    }
}

/// Human-readable byte count for progress bars and logs.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Strip ANSI escapes and collapse whitespace so extractor stderr can be
/// surfaced to users and HTTP clients.
pub fn sanitize_error_message(message: &str) -> String {
    let cleaned = ansi_re().replace_all(message, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
