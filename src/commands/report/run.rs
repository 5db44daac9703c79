use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::assemble::{PageAssembler, ReportPage};
use super::discovery::{BenchArtifacts, discover_artifacts};
use super::document::{build_document, save_document};
use super::ground_truth::{GroundTruthSource, load_dataset_split};
use super::normalize::{NormalizedResults, load_results};
use crate::cli::{GroundTruthMode, ReportArgs};
use crate::config::{ReportPaths, resolve_paths};
use crate::model::{ArtifactPaths, ReportCounts, ReportRunManifest};
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};

const MANIFEST_VERSION: u32 = 1;

pub fn run(args: ReportArgs) -> Result<()> {
    if !(args.image_width_in.is_finite() && args.image_width_in > 0.0) {
        bail!("--image-width-in must be a positive number of inches");
    }

    let paths = resolve_paths(&args.paths)?;
    let run_id = format!("report-{}", utc_compact_string(Utc::now()));
    info!(
        run_id = %run_id,
        out_folder = %paths.out_folder.display(),
        dataset_folder = %paths.dataset_folder.display(),
        gt_source = args.gt_source.as_str(),
        "starting report"
    );

    let artifacts = discover_artifacts(&paths.out_folder)?;
    match count_jsonl_records(&artifacts.bench_file.path) {
        Ok(records) => info!(records, "benchmark stats file lines"),
        Err(err) => warn!(
            path = %artifacts.bench_file.path.display(),
            error = %format!("{err:#}"),
            "benchmark stats file unreadable, continuing"
        ),
    }

    let results = load_results(&artifacts.results_file.path)?;

    let temp_folder = paths.temp_folder();
    ensure_directory(&temp_folder)?;
    let source = build_ground_truth_source(args.gt_source, &paths, &args.gt_glob, &temp_folder)?;

    let assembler = PageAssembler::new(&source, results.schema, &temp_folder);
    let pages = assembler.assemble_all(&results);

    let document_path = paths
        .out_folder
        .join(format!("bench_results{}.docx", args.suffix));
    save_document(build_document(&pages, args.image_width_in), &document_path)?;
    info!(path = %document_path.display(), pages = pages.len(), "output saved");

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        paths
            .out_folder
            .join(format!("bench_results{}_manifest.json", args.suffix))
    });
    let manifest = build_manifest(
        run_id,
        &source,
        &results,
        &artifacts,
        &paths,
        &document_path,
        &pages,
    )?;
    write_json_pretty(&manifest_path, &manifest)?;
    info!(
        path = %manifest_path.display(),
        items = manifest.counts.item_count,
        generated_embedded = manifest.counts.generated_embedded,
        ground_truth_embedded = manifest.counts.ground_truth_embedded,
        items_with_warnings = manifest.counts.items_with_warnings,
        "wrote report manifest"
    );

    Ok(())
}

fn build_ground_truth_source(
    mode: GroundTruthMode,
    paths: &ReportPaths,
    gt_glob: &str,
    temp_folder: &Path,
) -> Result<GroundTruthSource> {
    match mode {
        GroundTruthMode::Folder => {
            glob::Pattern::new(gt_glob)
                .with_context(|| format!("invalid --gt-glob pattern: {gt_glob}"))?;
            Ok(GroundTruthSource::folder(&paths.dataset_folder, gt_glob))
        }
        GroundTruthMode::DatasetSplit => {
            let Some(split_path) = paths.dataset_split.as_ref() else {
                bail!("dataset-split ground truth requires --dataset-split or paths.dataset_split");
            };
            let entries = load_dataset_split(split_path)?;
            Ok(GroundTruthSource::dataset_split(entries, temp_folder))
        }
    }
}

/// Non-blank lines, counted on raw bytes so the encoding never matters.
pub(crate) fn count_jsonl_records(path: &Path) -> Result<usize> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .split(|byte| *byte == b'\n')
        .filter(|line| line.iter().any(|byte| !byte.is_ascii_whitespace()))
        .count())
}

fn build_manifest(
    run_id: String,
    source: &GroundTruthSource,
    results: &NormalizedResults,
    artifacts: &BenchArtifacts,
    paths: &ReportPaths,
    document_path: &Path,
    pages: &[ReportPage],
) -> Result<ReportRunManifest> {
    let results_sha256 = sha256_file(&artifacts.results_file.path)?;

    Ok(ReportRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        generated_at: now_utc_string(),
        ground_truth_source: source.name().to_string(),
        plot_schema: results.schema,
        results_sha256,
        paths: ArtifactPaths {
            bench_file: display(&artifacts.bench_file.path),
            results_file: display(&artifacts.results_file.path),
            dataset_folder: display(&paths.dataset_folder),
            dataset_split: paths.dataset_split.as_deref().map(display),
            document: display(document_path),
        },
        counts: summarize(pages),
        items: pages.iter().map(ReportPage::outcome).collect(),
    })
}

pub(crate) fn summarize(pages: &[ReportPage]) -> ReportCounts {
    ReportCounts {
        item_count: pages.len(),
        generated_embedded: pages
            .iter()
            .filter(|page| page.generated.content.is_image())
            .count(),
        ground_truth_embedded: pages
            .iter()
            .filter(|page| page.ground_truth.content.is_image())
            .count(),
        ground_truth_ambiguous: pages
            .iter()
            .filter(|page| page.ground_truth_ambiguous)
            .count(),
        items_with_warnings: pages
            .iter()
            .filter(|page| page.notes.iter().any(|note| note.starts_with("Warning:")))
            .count(),
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
