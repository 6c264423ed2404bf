//! Manifest utility for Pulsewatch model artifacts.
//!
//! Writes `manifest.json` binding the classifier and scaler by SHA-256
//! digest, so a later `--require-manifest` load refuses any other files.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin write_manifest -- <model_dir>
//! ```
//!
//! The artifacts are parsed before anything is written: a manifest is never
//! produced for files the service would refuse to load.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pulsewatch::adapters::artifacts::{
    ArtifactManifest, LogisticRegressionModel, StandardScaler, MANIFEST_FILE_NAME,
    MODEL_FILE_NAME, SCALER_FILE_NAME,
};

#[derive(Debug, Parser)]
#[command(name = "write_manifest", about = "Write manifest.json for a model directory")]
struct Cli {
    /// Directory holding heart_disease_model.json and scaler.json (or one of those files)
    #[arg(default_value = "models")]
    model_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let model_dir = if cli.model_dir.is_file() {
        cli.model_dir
            .parent()
            .context("Model path has no parent directory")?
            .to_path_buf()
    } else {
        cli.model_dir
    };

    let model_path = model_dir.join(MODEL_FILE_NAME);
    let scaler_path = model_dir.join(SCALER_FILE_NAME);
    let model_bytes =
        fs::read(&model_path).with_context(|| format!("Failed to read {model_path:?}"))?;
    let scaler_bytes =
        fs::read(&scaler_path).with_context(|| format!("Failed to read {scaler_path:?}"))?;
    LogisticRegressionModel::from_json(&model_path, &model_bytes)?;
    StandardScaler::from_json(&scaler_path, &scaler_bytes)?;

    let manifest = ArtifactManifest::for_files(&model_dir, &[MODEL_FILE_NAME, SCALER_FILE_NAME])?;
    let mut manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest.json")?;
    manifest_bytes.push(b'\n');

    let manifest_path = model_dir.join(MANIFEST_FILE_NAME);
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {manifest_path:?}"))?;

    println!("Wrote manifest: {manifest_path:?}");
    for (file, digest) in &manifest.files {
        println!("  {file}: {digest}");
    }
    Ok(())
}
