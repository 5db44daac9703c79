use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info};

use crate::util::glob_by_mtime;

pub(crate) const BENCH_STAT_PATTERN: &str = "benchmark_stat*.jsonl";
pub(crate) const RESULTS_PATTERN: &str = "results_*.json";

#[derive(Error, Debug)]
pub(crate) enum DiscoveryError {
    #[error("no such file: no {pattern} files found in {}", .dir.display())]
    NotFound { pattern: &'static str, dir: PathBuf },
}

#[derive(Debug, Clone)]
pub(crate) struct DiscoveredFile {
    pub(crate) path: PathBuf,
    pub(crate) modified: SystemTime,
    pub(crate) candidates: usize,
}

/// The two required inputs of a report run.
#[derive(Debug, Clone)]
pub(crate) struct BenchArtifacts {
    pub(crate) bench_file: DiscoveredFile,
    pub(crate) results_file: DiscoveredFile,
}

/// Picks the newest stats and results files. Both must exist; nothing is
/// read until both globs have matched.
pub(crate) fn discover_artifacts(out_folder: &Path) -> Result<BenchArtifacts> {
    let bench_file = latest_required(out_folder, BENCH_STAT_PATTERN)?;
    let results_file = latest_required(out_folder, RESULTS_PATTERN)?;

    info!(path = %bench_file.path.display(), candidates = bench_file.candidates, "using benchmark file");
    info!(path = %results_file.path.display(), candidates = results_file.candidates, "using results file");

    Ok(BenchArtifacts {
        bench_file,
        results_file,
    })
}

pub(crate) fn latest_matching(dir: &Path, pattern: &'static str) -> Result<Option<DiscoveredFile>> {
    let mut matches = glob_by_mtime(dir, pattern)?;
    let candidates = matches.len();
    debug!(dir = %dir.display(), pattern, candidates, "globbed input files");

    Ok(matches.pop().map(|(path, modified)| DiscoveredFile {
        path,
        modified,
        candidates,
    }))
}

fn latest_required(dir: &Path, pattern: &'static str) -> Result<DiscoveredFile> {
    match latest_matching(dir, pattern)? {
        Some(found) => Ok(found),
        None => Err(DiscoveryError::NotFound {
            pattern,
            dir: dir.to_path_buf(),
        }
        .into()),
    }
}
