// ============================================================
// Layer 6 — Dataset and Model Acquisition
// ============================================================
// Fetches the SQuAD JSON files and pretrained BERT files into
// local directories. Files that already exist are left alone,
// so running a download twice is a no-op the second time.
//
// Each file is streamed to `<name>.part` and renamed into place
// only after the transfer finished, so an interrupted download
// never leaves a truncated file that looks complete.
//
// Errors are returned as-is. Nothing here retries: a broken
// download is fatal for the run.

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

pub const SQUAD_BASE_URL: &str = "https://rajpurkar.github.io/SQuAD-explorer/dataset/";

pub const SQUAD_FILES: [&str; 4] = [
    "train-v1.1.json",
    "dev-v1.1.json",
    "train-v2.0.json",
    "dev-v2.0.json",
];

pub const HF_BASE_URL: &str = "https://huggingface.co";

/// Files needed to build a reader from a HuggingFace BERT checkpoint
pub const PRETRAINED_FILES: [&str; 3] = ["config.json", "vocab.txt", "pytorch_model.bin"];

/// Make sure every SQuAD file is present in `dir`
pub fn download_squad(dir: &Path) -> Result<Vec<PathBuf>> {
    download_squad_from(SQUAD_BASE_URL, dir)
}

pub fn download_squad_from(base_url: &str, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create data directory '{}'", dir.display()))?;

    SQUAD_FILES
        .iter()
        .map(|name| ensure_file(&join_url(base_url, name), &dir.join(name)))
        .collect()
}

/// Fetch a pretrained checkpoint into `models_dir/<repo id>`.
/// Returns the model directory.
pub fn download_pretrained(model_id: &str, models_dir: &Path) -> Result<PathBuf> {
    let model_dir = models_dir.join(model_id.replace('/', "_"));
    fs::create_dir_all(&model_dir)
        .with_context(|| format!("Cannot create model directory '{}'", model_dir.display()))?;

    for name in PRETRAINED_FILES {
        let url = format!("{HF_BASE_URL}/{model_id}/resolve/main/{name}");
        ensure_file(&url, &model_dir.join(name))?;
    }
    Ok(model_dir)
}

/// Download `url` to `path` unless `path` already exists
pub fn ensure_file(url: &str, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        tracing::info!("Already present: {}", path.display());
    } else {
        download_file(url, path)?;
    }
    Ok(path.to_path_buf())
}

/// Download a file from a URL to a local path
pub fn download_file(url: &str, output_path: &Path) -> Result<()> {
    tracing::info!("Downloading {} → {}", url, output_path.display());

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    // The default blocking client gives up after 30s, far too
    // short for a 400MB checkpoint
    let client = reqwest::blocking::Client::builder()
        .timeout(None::<std::time::Duration>)
        .build()
        .context("Failed to build HTTP client")?;

    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to download from {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to download {url}: HTTP {}", response.status());
    }

    let part_path = output_path.with_extension("part");
    let mut file = File::create(&part_path)
        .with_context(|| format!("Failed to create file '{}'", part_path.display()))?;
    let bytes = response
        .copy_to(&mut file)
        .with_context(|| format!("Transfer from {url} interrupted"))?;
    file.sync_all()?;
    drop(file);

    fs::rename(&part_path, output_path)
        .with_context(|| format!("Cannot move download into '{}'", output_path.display()))?;

    tracing::info!("Download complete: {} ({} bytes)", output_path.display(), bytes);
    Ok(())
}

fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}
