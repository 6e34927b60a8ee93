//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod output;
pub mod parse;
pub mod request;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use waybill_core::models::config::WaybillConfig;
use waybill_core::pipeline::DocumentPipeline;

/// Location of the user configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waybill")
        .join("config.json")
}

/// Explicit file, else the user file when present, else defaults; legacy
/// environment variables are applied on top.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<WaybillConfig> {
    let config = match path {
        Some(path) => WaybillConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                debug!("Using config {}", path.display());
                WaybillConfig::from_file(&path)?
            } else {
                WaybillConfig::default()
            }
        }
    };

    Ok(config.with_process_env())
}

pub fn build_pipeline(config_path: Option<&Path>) -> anyhow::Result<DocumentPipeline> {
    let config = load_config(config_path)?;
    DocumentPipeline::from_config(&config).context("Invalid configuration")
}

/// MIME type for a path, from its extension.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(waybill_core::DocumentKind::content_type_for_extension)
}
