//! Artifact export: one JSON file and one CSV file per completed query.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;
use serprobe_core::models::{PageAudit, SerpResponse};

pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Write `serp_<query>_<stamp>.json` and a companion CSV with header
/// `position,title,url,description,query` into `dir`.
pub fn export_response(dir: &Path, response: &SerpResponse) -> Result<ExportPaths> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let base = format!("serp_{}_{}", sanitize(&response.query), stamp());

    let json = dir.join(format!("{base}.json"));
    fs::write(&json, serde_json::to_string_pretty(response)?)
        .with_context(|| format!("Failed to write {}", json.display()))?;

    let csv = dir.join(format!("{base}.csv"));
    let mut writer = csv::Writer::from_path(&csv)
        .with_context(|| format!("Failed to write {}", csv.display()))?;
    for result in &response.results {
        writer.serialize(result)?;
    }
    writer.flush()?;

    Ok(ExportPaths { json, csv })
}

/// Write `page_audit_<url>_<stamp>.json` into `dir`.
pub fn export_audit(dir: &Path, audit: &PageAudit) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let path = dir.join(format!("page_audit_{}_{}.json", sanitize(&audit.url), stamp()));
    fs::write(&path, serde_json::to_string_pretty(audit)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Non-word characters collapse to `_`, capped at 50 chars.
fn sanitize(text: &str) -> String {
    let re = Regex::new(r"\W+").expect("sanitize pattern is valid");
    let safe = re.replace_all(text, "_").into_owned();
    safe.chars().take(50).collect()
}
