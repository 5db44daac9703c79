use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{Value, json};

use super::assemble::{
    CellContent, INVALID_IMAGE_DATA, NO_GROUND_TRUTH, NO_IMAGE_GENERATED, NO_IMAGES_EMPTY_LIST,
    PageAssembler,
};
use super::ground_truth::{GroundTruth, GroundTruthSource, Unavailable, index_split_records};
use super::normalize::{NormalizeError, normalize_results};
use super::run::summarize;
use crate::cli::{GroundTruthMode, PathArgs, ReportArgs};
use crate::model::{FieldValue, ItemId, PlotSchema};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 37 % 256) as u8, (y * 91 % 256) as u8, ((x ^ y) * 13 % 256) as u8, 255])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("png fixture should encode");
    buf.into_inner()
}

fn png_base64(width: u32, height: u32) -> String {
    STANDARD.encode(png_bytes(width, height))
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    fs::create_dir_all(dir).expect("create image dir");
    let path = dir.join(name);
    fs::write(&path, png_bytes(width, height)).expect("write png fixture");
    path
}

fn read_document_xml(path: &Path) -> String {
    let file = fs::File::open(path).expect("open document");
    let mut archive = zip::ZipArchive::new(file).expect("document is a zip archive");
    let mut entry = archive
        .by_name("word/document.xml")
        .expect("document has a body part");
    let mut xml = String::new();
    entry.read_to_string(&mut xml).expect("body is utf-8 xml");
    xml
}

fn single_record(results: &Value) -> crate::model::ResultRecord {
    let normalized = normalize_results(results).expect("results should normalize");
    normalized
        .records
        .into_values()
        .next()
        .expect("one record")
}

fn report_args(dir: &Path, dataset_folder: &Path, out_folder: &Path) -> ReportArgs {
    ReportArgs {
        paths: PathArgs {
            config: dir.join("absent-config.toml"),
            dataset_folder: Some(dataset_folder.to_path_buf()),
            out_folder: Some(out_folder.to_path_buf()),
            dataset_split: None,
        },
        gt_source: GroundTruthMode::Folder,
        gt_glob: "*.png".to_string(),
        suffix: String::new(),
        manifest_path: None,
        image_width_in: 4.0,
    }
}

#[test]
fn normalize_builds_one_record_per_id_row_with_matching_fields() {
    let columnar = json!({
        "id": {"0": 7, "1": 3, "2": 11},
        "score_vis": {"0": 80, "1": 55.5, "2": 10},
        "score_task": {"0": 90, "2": 20},
        "plot_b64": {"0": "aGVsbG8=", "1": "", "2": null}
    });

    let normalized = normalize_results(&columnar).expect("valid columnar input");
    assert_eq!(normalized.records.len(), 3);
    assert_eq!(normalized.schema, PlotSchema::SingleImage);

    let second = &normalized.records[&ItemId::new("3")];
    assert_eq!(second.field("score_vis"), Some(&json!(55.5)));
    assert_eq!(second.fields.get("score_task"), Some(&FieldValue::Absent));
    assert_eq!(second.field("plot_b64"), Some(&json!("")));
    assert!(!second.fields.contains_key("id"));

    let third = &normalized.records[&ItemId::new("11")];
    assert_eq!(third.field("score_task"), Some(&json!(20)));
    assert_eq!(third.field("plot_b64"), Some(&Value::Null));
    assert!(third.metric("plot_b64").is_none());
}

#[test]
fn normalize_orders_rows_by_numeric_index() {
    let columnar = json!({
        "id": {"10": "k", "2": "c", "0": "a", "1": "b"},
    });

    let normalized = normalize_results(&columnar).expect("valid columnar input");
    let ids = normalized
        .ids()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["a", "b", "c", "k"]);
}

#[test]
fn normalize_rejects_input_without_id_column() {
    let columnar = json!({"score_vis": {"0": 1}, "plot_b64": {"0": "x"}});
    assert_eq!(
        normalize_results(&columnar).expect_err("id is required"),
        NormalizeError::MissingIdField
    );
    assert_eq!(
        normalize_results(&json!([1, 2])).expect_err("object is required"),
        NormalizeError::NotAnObject
    );
    assert!(
        NormalizeError::MissingIdField
            .to_string()
            .contains("malformed results file")
    );
}

#[test]
fn normalize_prefers_multi_image_schema_when_present() {
    let columnar = json!({"id": {"0": 1}, "plots_generated": {"0": []}});
    let normalized = normalize_results(&columnar).expect("valid columnar input");
    assert_eq!(normalized.schema, PlotSchema::MultiImage);
}

#[test]
fn folder_strategy_reports_missing_single_and_ambiguous_matches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = dir.path().join("dataset");
    fs::create_dir_all(dataset.join("1")).expect("empty item dir");
    write_png(&dataset.join("2"), "gt.png", 4, 4);
    for name in ["c.png", "a.png", "b.png"] {
        write_png(&dataset.join("3"), name, 4, 4);
    }
    fs::write(dataset.join("3").join("notes.txt"), "ignored").expect("write non-image");

    let source = GroundTruthSource::folder(&dataset, "*.png");

    assert_eq!(
        source.resolve(&ItemId::new("1")),
        GroundTruth::Unavailable(Unavailable::NoImages {
            dir: dataset.join("1")
        })
    );
    assert!(matches!(
        source.resolve(&ItemId::new("404")),
        GroundTruth::Unavailable(Unavailable::NoImages { .. })
    ));

    let single = source.resolve(&ItemId::new("2"));
    assert_eq!(
        single,
        GroundTruth::Found {
            path: dataset.join("2").join("gt.png"),
            candidates: 1
        }
    );
    assert!(single.ambiguity_note().is_none());

    let ambiguous = source.resolve(&ItemId::new("3"));
    assert_eq!(
        ambiguous,
        GroundTruth::Found {
            path: dataset.join("3").join("a.png"),
            candidates: 3
        }
    );
    assert_eq!(
        ambiguous.ambiguity_note().as_deref(),
        Some("Note: Found 3 images in GT, using the first one")
    );
}

#[test]
fn dataset_split_strategy_decodes_first_plot_and_flags_extras() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = png_bytes(6, 3);
    let entries = index_split_records(vec![
        json!({"id": 1, "plots_gt": []}),
        json!({"id": 2}),
        json!({"id": 3, "plots_gt": [STANDARD.encode(&first), png_base64(2, 2)]}),
        json!({"id": 4, "plots_gt": "not-a-list"}),
        json!({"id": 5, "plots_gt": ["%%%not base64%%%"]}),
        json!({"plots_gt": ["orphan"]}),
    ]);
    assert_eq!(entries.len(), 5);

    let source = GroundTruthSource::dataset_split(entries, dir.path());

    assert_eq!(
        source.resolve(&ItemId::new("1")),
        GroundTruth::Unavailable(Unavailable::NoPlotsInEntry)
    );
    assert_eq!(
        source.resolve(&ItemId::new("2")),
        GroundTruth::Unavailable(Unavailable::NoPlotsInEntry)
    );
    assert_eq!(
        source.resolve(&ItemId::new("99")),
        GroundTruth::Unavailable(Unavailable::NotInSplit)
    );
    assert_eq!(
        source.resolve(&ItemId::new("4")),
        GroundTruth::Unavailable(Unavailable::UnexpectedShape("string"))
    );

    let resolved = source.resolve(&ItemId::new("3"));
    let GroundTruth::Found { path, candidates } = &resolved else {
        panic!("expected a decoded ground truth, got {resolved:?}");
    };
    assert_eq!(*candidates, 2);
    assert_eq!(resolved.extra_candidates(), 1);
    assert_eq!(fs::read(path).expect("read decoded gt"), first);

    assert!(matches!(
        source.resolve(&ItemId::new("5")),
        GroundTruth::DecodeFailed { candidates: 1, .. }
    ));
}

#[test]
fn unavailable_reasons_produce_distinct_warnings() {
    let id = ItemId::new("42");
    let missing_folder = GroundTruth::Unavailable(Unavailable::NoImages {
        dir: PathBuf::from("dataset/42"),
    })
    .warning(&id);
    let missing_entry = GroundTruth::Unavailable(Unavailable::NotInSplit).warning(&id);
    let empty_entry = GroundTruth::Unavailable(Unavailable::NoPlotsInEntry).warning(&id);

    assert_eq!(
        missing_folder.as_deref(),
        Some("Warning: No ground truth image found for ID 42")
    );
    assert_ne!(missing_entry, empty_entry);
    assert_ne!(missing_entry, missing_folder);
}

#[test]
fn multi_image_cells_explain_each_unusable_shape() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = GroundTruthSource::folder(dir.path().join("dataset"), "*.png");
    let assembler = PageAssembler::new(&source, PlotSchema::MultiImage, dir.path());

    let cell_text = |plots: Value| {
        let record = single_record(&json!({"id": {"0": 1}, "plots_generated": {"0": plots}}));
        assembler.assemble(&record).generated.content
    };

    assert_eq!(
        cell_text(json!([])),
        CellContent::Text(NO_IMAGES_EMPTY_LIST.to_string())
    );
    assert_eq!(NO_IMAGES_EMPTY_LIST, "No images (empty list)");

    let unexpected = cell_text(json!("not-a-list"));
    assert!(
        unexpected.text().is_some_and(|text| text.contains("string")),
        "got {unexpected:?}"
    );

    assert_eq!(
        cell_text(json!(["short"])),
        CellContent::Text(INVALID_IMAGE_DATA.to_string())
    );
    assert_eq!(
        cell_text(json!([12345])),
        CellContent::Text(INVALID_IMAGE_DATA.to_string())
    );

    let undecodable = cell_text(json!(["!".repeat(150)]));
    let text = undecodable.text().expect("decode failure renders text");
    assert!(text.starts_with("Error decoding image:"), "got {text}");
    assert!(text.chars().count() <= "Error decoding image: ".len() + 103);

    assert!(cell_text(json!([png_base64(32, 24), "ignored"])).is_image());
}

#[test]
fn corrupt_but_valid_base64_is_annotated_at_embed_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = GroundTruthSource::folder(dir.path().join("dataset"), "*.png");
    let assembler = PageAssembler::new(&source, PlotSchema::SingleImage, dir.path());

    let payload = STANDARD.encode(b"definitely not an image, just text bytes");
    let record = single_record(&json!({"id": {"0": 5}, "plot_b64": {"0": payload}}));
    let page = assembler.assemble(&record);

    let text = page
        .generated
        .content
        .text()
        .expect("embed failure renders text");
    assert!(text.starts_with("Error embedding image:"), "got {text}");
}

#[test]
fn metric_lines_are_emitted_only_for_present_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = GroundTruthSource::folder(dir.path().join("dataset"), "*.png");
    let assembler = PageAssembler::new(&source, PlotSchema::SingleImage, dir.path());

    let columnar = json!({
        "id": {"0": "item-a", "1": "item-b"},
        "score_vis": {"0": 75},
        "score_task": {"0": null, "1": 3.5},
        "has_plot": {"0": true, "1": false}
    });
    let normalized = normalize_results(&columnar).expect("valid columnar input");
    let pages = assembler.assemble_all(&normalized);

    assert_eq!(pages[0].metrics, vec!["Vis Score = 75", "Has Plot = True"]);
    assert_eq!(pages[1].metrics, vec!["Task Score = 3.5", "Has Plot = False"]);
    assert_eq!(pages[0].header_lines()[0], "ID = item-a");
}

#[test]
fn two_item_run_renders_one_page_per_result_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = dir.path().join("dataset");
    let out = dir.path().join("out");
    write_png(&dataset.join("101"), "gt.png", 10, 10);
    fs::create_dir_all(&out).expect("create out folder");
    fs::write(out.join("benchmark_stat_run.jsonl"), "{\"model\":\"m\"}\n").expect("write stats");

    let columnar = json!({
        "id": {"0": 101, "1": 102},
        "score_vis": {"0": 88, "1": 0},
        "plot_b64": {"0": png_base64(10, 10), "1": ""}
    });
    fs::write(
        out.join("results_run.json"),
        serde_json::to_vec(&columnar).expect("serialize results"),
    )
    .expect("write results");

    let source = GroundTruthSource::folder(&dataset, "*.png");
    let temp = out.join("temp");
    fs::create_dir_all(&temp).expect("create temp");
    let normalized = normalize_results(&columnar).expect("valid columnar input");
    let assembler = PageAssembler::new(&source, normalized.schema, &temp);
    let pages = assembler.assemble_all(&normalized);

    assert_eq!(pages.len(), 2);
    assert!(pages[0].generated.content.is_image());
    assert!(pages[0].ground_truth.content.is_image());
    assert_eq!(pages[1].generated.content.text(), Some(NO_IMAGE_GENERATED));
    assert_eq!(pages[1].ground_truth.content.text(), Some(NO_GROUND_TRUTH));
    assert_eq!(
        pages[1].notes,
        vec!["Warning: No ground truth image found for ID 102".to_string()]
    );

    let counts = summarize(&pages);
    assert_eq!(counts.generated_embedded, 1);
    assert_eq!(counts.ground_truth_embedded, 1);
    assert_eq!(counts.items_with_warnings, 1);

    super::run(report_args(dir.path(), &dataset, &out)).expect("report run should succeed");

    let document_xml = read_document_xml(&out.join("bench_results.docx"));
    assert_eq!(document_xml.matches("<w:tbl>").count(), 2);
    assert_eq!(document_xml.matches("w:type=\"page\"").count(), 2);
    assert_eq!(document_xml.matches("<w:drawing>").count(), 2);
    assert!(document_xml.contains("w:w=\"16838\""));
    assert!(document_xml.contains("w:h=\"11906\""));
    assert!(document_xml.contains(NO_IMAGE_GENERATED));
    assert!(document_xml.contains(NO_GROUND_TRUTH));

    let second_page = document_xml
        .split("w:type=\"page\"")
        .nth(1)
        .expect("content after the first page break");
    assert!(second_page.contains("ID = 102"));
    assert!(!second_page.contains("<w:drawing>"));

    let manifest: Value = serde_json::from_slice(
        &fs::read(out.join("bench_results_manifest.json")).expect("manifest written"),
    )
    .expect("manifest is json");
    assert_eq!(manifest["counts"]["item_count"], json!(2));
    assert_eq!(manifest["items"][0]["id"], json!("101"));
    assert_eq!(manifest["items"][1]["generated"], json!(NO_IMAGE_GENERATED));
    assert_eq!(manifest["plot_schema"], json!("single_image"));
    assert_eq!(manifest["ground_truth_source"], json!("folder"));
}

#[test]
fn assembling_twice_yields_identical_page_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = dir.path().join("dataset");
    write_png(&dataset.join("1"), "a.png", 8, 8);
    write_png(&dataset.join("1"), "b.png", 8, 8);

    let columnar = json!({
        "id": {"0": 1, "1": 2},
        "score_task": {"0": 4, "1": 5},
        "plots_generated": {"0": [png_base64(16, 16)], "1": "broken"}
    });
    let normalized = normalize_results(&columnar).expect("valid columnar input");
    let source = GroundTruthSource::folder(&dataset, "*.png");
    let assembler = PageAssembler::new(&source, normalized.schema, dir.path());

    let first = assembler
        .assemble_all(&normalized)
        .iter()
        .map(|page| page.text_content())
        .collect::<Vec<_>>();
    let second = assembler
        .assemble_all(&normalized)
        .iter()
        .map(|page| page.text_content())
        .collect::<Vec<_>>();

    assert_eq!(first, second);
    assert!(first[0].contains("Note: Found 2 images in GT, using the first one"));
}

#[test]
fn undecodable_stats_file_does_not_abort_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    fs::create_dir_all(&out).expect("create out folder");
    fs::write(out.join("benchmark_stat.jsonl"), [0xff, 0xfe, b'\n']).expect("write stats");
    fs::write(out.join("results_a.json"), r#"{"id": {"0": 1}}"#).expect("write results");

    assert_eq!(
        super::count_jsonl_records(&out.join("benchmark_stat.jsonl")).expect("bytes are readable"),
        1
    );

    super::run(report_args(dir.path(), &dir.path().join("dataset"), &out))
        .expect("stats file content is never fatal");
    assert!(out.join("bench_results.docx").exists());
}

#[test]
fn folder_strategy_refuses_ids_that_leave_the_dataset_folder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = dir.path().join("dataset");
    write_png(&dir.path().join("outside"), "leak.png", 4, 4);
    write_png(&dataset.join("ok"), "gt.png", 4, 4);

    let source = GroundTruthSource::folder(&dataset, "*.png");
    for id in ["../outside", "a/b", "..", ".", "", "a\\b"] {
        assert_eq!(
            source.resolve(&ItemId::new(id)),
            GroundTruth::Unavailable(Unavailable::UnsafeId),
            "id {id:?}"
        );
    }
    assert!(matches!(
        source.resolve(&ItemId::new("ok")),
        GroundTruth::Found { candidates: 1, .. }
    ));
    assert_eq!(
        GroundTruth::Unavailable(Unavailable::UnsafeId)
            .warning(&ItemId::new("../outside"))
            .as_deref(),
        Some("Warning: ID ../outside cannot name a ground truth directory")
    );
}

#[test]
fn missing_inputs_abort_before_any_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = dir.path().join("dataset");
    let out = dir.path().join("out");
    fs::create_dir_all(&out).expect("create out folder");
    fs::write(out.join("results_only.json"), r#"{"id": {"0": 1}}"#).expect("write results");

    let err = super::run(report_args(dir.path(), &dataset, &out))
        .expect_err("missing stats file is fatal");
    assert!(err.to_string().contains("benchmark_stat*.jsonl"), "got {err}");
    assert!(!out.join("bench_results.docx").exists());

    fs::write(out.join("benchmark_stat.jsonl"), "").expect("write stats");
    fs::write(out.join("results_only.json"), r#"{"score_vis": {"0": 1}}"#)
        .expect("rewrite results");
    let err = super::run(report_args(dir.path(), &dataset, &out))
        .expect_err("results without id are fatal");
    assert!(
        err.chain()
            .any(|cause| cause.to_string().contains("missing `id` field")),
        "got {err:#}"
    );
    assert!(!out.join("bench_results.docx").exists());
}

#[test]
fn dataset_split_run_requires_split_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    fs::create_dir_all(&out).expect("create out folder");
    fs::write(out.join("benchmark_stat.jsonl"), "{}\n").expect("write stats");
    fs::write(out.join("results_a.json"), r#"{"id": {"0": 1}}"#).expect("write results");

    let mut args = report_args(dir.path(), &dir.path().join("dataset"), &out);
    args.gt_source = GroundTruthMode::DatasetSplit;
    assert!(super::run(args.clone()).is_err());

    let split = dir.path().join("split.jsonl");
    fs::write(
        &split,
        format!("{}\n", json!({"id": 1, "plots_gt": [png_base64(5, 5)]})),
    )
    .expect("write split");
    args.paths.dataset_split = Some(split);
    args.suffix = "_split".to_string();
    super::run(args).expect("dataset-split run should succeed");

    let manifest: Value = serde_json::from_slice(
        &fs::read(out.join("bench_results_split_manifest.json")).expect("manifest written"),
    )
    .expect("manifest is json");
    assert_eq!(manifest["counts"]["ground_truth_embedded"], json!(1));
    assert_eq!(manifest["items"][0]["generated"], json!(NO_IMAGE_GENERATED));
    assert!(out.join("temp").join("gt_plot.png").exists());
}
