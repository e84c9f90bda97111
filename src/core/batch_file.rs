//! Batch-list file parsing.
//!
//! Plain text files carry one URL per line; CSV exports are accepted too, any
//! field starting with `http` counts (covers both `url`-headered and
//! headerless single-column files).

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::core::models::{AppError, AppResult};

/// Parse a batch file into a deduplicated, order-preserving URL list.
pub fn parse_batch_file(path: &Path) -> AppResult<Vec<String>> {
    if !path.exists() {
        return Err(AppError::Batch(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let urls = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => parse_csv(path)?,
        _ => parse_txt(path)?,
    };

    let urls = dedup_preserving_order(urls);

    if urls.is_empty() {
        return Err(AppError::Batch(format!(
            "No valid URLs found in {}",
            path.display()
        )));
    }

    info!("📄 Parsed {} URLs from {}", urls.len(), path.display());
    Ok(urls)
}

fn parse_txt(path: &Path) -> AppResult<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http"))
        .map(str::to_string)
        .collect())
}

fn parse_csv(path: &Path) -> AppResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AppError::Batch(format!("Failed to read CSV: {}", e)))?;

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::Batch(format!("Malformed CSV row: {}", e)))?;
        if let Some(url) = record
            .iter()
            .map(str::trim)
            .find(|field| field.starts_with("http"))
        {
            urls.push(url.to_string());
        }
    }
    Ok(urls)
}

fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
