use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::report::{
    BENCH_STAT_PATTERN, RESULTS_PATTERN, count_jsonl_records, latest_matching, load_results,
};
use crate::config::resolve_paths;
use crate::util::system_time_string;

pub fn run(args: StatusArgs) -> Result<()> {
    let paths = resolve_paths(&args.paths)?;
    let out_folder = paths.out_folder.as_path();

    info!(
        out_folder = %out_folder.display(),
        dataset_folder = %paths.dataset_folder.display(),
        "status requested"
    );

    match latest_matching(out_folder, BENCH_STAT_PATTERN)? {
        Some(found) => {
            info!(
                path = %found.path.display(),
                modified = %system_time_string(found.modified),
                candidates = found.candidates,
                "latest benchmark stats file"
            );
            match count_jsonl_records(&found.path) {
                Ok(records) => info!(records, "benchmark stats file lines"),
                Err(err) => warn!(error = %format!("{err:#}"), "benchmark stats file unreadable"),
            }
        }
        None => warn!(pattern = BENCH_STAT_PATTERN, "benchmark stats file missing"),
    }

    match latest_matching(out_folder, RESULTS_PATTERN)? {
        Some(found) => {
            info!(
                path = %found.path.display(),
                modified = %system_time_string(found.modified),
                candidates = found.candidates,
                "latest results file"
            );
            match load_results(&found.path) {
                Ok(results) => info!(
                    items = results.records.len(),
                    schema = results.schema.column(),
                    "results file is well-formed"
                ),
                Err(err) => warn!(error = %format!("{err:#}"), "results file cannot be normalized"),
            }
        }
        None => warn!(pattern = RESULTS_PATTERN, "results file missing"),
    }

    if !paths.dataset_folder.is_dir() {
        warn!(path = %paths.dataset_folder.display(), "dataset folder missing");
    }
    if let Some(split) = paths.dataset_split.as_deref() {
        report_presence(split, "dataset split");
    }

    report_presence(
        &out_folder.join(format!("bench_results{}.docx", args.suffix)),
        "previous report",
    );

    Ok(())
}

fn report_presence(path: &Path, what: &str) {
    if path.exists() {
        info!(path = %path.display(), "{what} present");
    } else {
        warn!(path = %path.display(), "{what} missing");
    }
}
