use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "plotbench-report",
    version,
    about = "Consolidates plotting-benchmark results into a reviewable comparison report"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Report(ReportArgs),
    Status(StatusArgs),
}

/// Where reference images come from. Chosen once per run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum GroundTruthMode {
    Folder,
    DatasetSplit,
}

impl GroundTruthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::DatasetSplit => "dataset-split",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    #[arg(long, default_value = "configs/config.toml")]
    pub config: PathBuf,

    #[arg(long)]
    pub dataset_folder: Option<PathBuf>,

    #[arg(long)]
    pub out_folder: Option<PathBuf>,

    #[arg(long)]
    pub dataset_split: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    #[arg(long, value_enum, default_value_t = GroundTruthMode::Folder)]
    pub gt_source: GroundTruthMode,

    #[arg(long, default_value = "*.png")]
    pub gt_glob: String,

    #[arg(long, default_value = "")]
    pub suffix: String,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = 4.0)]
    pub image_width_in: f64,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    #[arg(long, default_value = "")]
    pub suffix: String,
}
