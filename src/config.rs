use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cli::PathArgs;

const DEFAULT_DATASET_FOLDER: &str = "dataset";
const DEFAULT_OUT_FOLDER: &str = "out";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub dataset_folder: Option<PathBuf>,
    pub out_folder: Option<PathBuf>,
    pub dataset_split: Option<PathBuf>,
}

/// Resolved locations for one run. Command-line values win over the file.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub dataset_folder: PathBuf,
    pub out_folder: PathBuf,
    pub dataset_split: Option<PathBuf>,
}

impl ReportPaths {
    pub fn temp_folder(&self) -> PathBuf {
        self.out_folder.join("temp")
    }
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        return Ok(FileConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: FileConfig =
        toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))?;

    info!(path = %path.display(), "loaded config");
    Ok(config)
}

pub fn resolve_paths(args: &PathArgs) -> Result<ReportPaths> {
    let file = load_file_config(&args.config)?;
    Ok(merge_paths(args, file.paths))
}

fn merge_paths(args: &PathArgs, file: PathsSection) -> ReportPaths {
    ReportPaths {
        dataset_folder: args
            .dataset_folder
            .clone()
            .or(file.dataset_folder)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_FOLDER)),
        out_folder: args
            .out_folder
            .clone()
            .or(file.out_folder)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_FOLDER)),
        dataset_split: args.dataset_split.clone().or(file.dataset_split),
    }
}
