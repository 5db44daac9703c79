use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageFormat;
use serde_json::Value;
use tracing::{debug, warn};

use super::codec::decode_to_file;
use super::ground_truth::{GroundTruth, GroundTruthSource};
use super::normalize::NormalizedResults;
use crate::model::{ItemId, ItemOutcome, PlotSchema, ResultRecord, json_type_name};
use crate::util::truncate_chars;

pub(crate) const GENERATED_CAPTION: &str = "Generated";
pub(crate) const GROUND_TRUTH_CAPTION: &str = "Ground truth";
pub(crate) const PLOT_SCRATCH_FILE: &str = "plot.png";

pub(crate) const NO_IMAGE_GENERATED: &str = "No image generated";
pub(crate) const NO_IMAGES_EMPTY_LIST: &str = "No images (empty list)";
pub(crate) const INVALID_IMAGE_DATA: &str = "Invalid image data";
pub(crate) const NO_GROUND_TRUTH: &str = "No ground truth image";

const METRIC_LINES: [(&str, &str); 3] = [
    ("score_vis", "Vis Score"),
    ("score_task", "Task Score"),
    ("has_plot", "Has Plot"),
];

/// Payloads at or below this length cannot be an encoded image.
const MIN_PLAUSIBLE_PAYLOAD_CHARS: usize = 100;
const MAX_ERROR_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EmbeddedImage {
    pub(crate) png: Vec<u8>,
    pub(crate) width_px: u32,
    pub(crate) height_px: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CellContent {
    Image(EmbeddedImage),
    Text(String),
}

impl CellContent {
    pub(crate) fn text(&self) -> Option<&str> {
        match self {
            Self::Image(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    pub(crate) fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    fn summary(&self) -> String {
        match self {
            Self::Image(image) => format!("embedded {}x{}", image.width_px, image.height_px),
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReportCell {
    pub(crate) caption: &'static str,
    pub(crate) content: CellContent,
}

/// One item's page: centred header lines, then a generated / ground-truth table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReportPage {
    pub(crate) id: ItemId,
    pub(crate) metrics: Vec<String>,
    pub(crate) notes: Vec<String>,
    pub(crate) generated: ReportCell,
    pub(crate) ground_truth: ReportCell,
    pub(crate) ground_truth_ambiguous: bool,
}

impl ReportPage {
    pub(crate) fn header_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(1 + self.metrics.len() + self.notes.len());
        lines.push(format!("ID = {}", self.id));
        lines.extend(self.metrics.iter().cloned());
        lines.extend(self.notes.iter().cloned());
        lines
    }

    /// Every piece of text on the page, images reduced to their dimensions.
    pub(crate) fn text_content(&self) -> String {
        let mut text = self.header_lines().join("\n");
        for cell in [&self.generated, &self.ground_truth] {
            text.push('\n');
            text.push_str(cell.caption);
            text.push('\n');
            text.push_str(&cell.content.summary());
        }
        text
    }

    pub(crate) fn outcome(&self) -> ItemOutcome {
        ItemOutcome {
            id: self.id.clone(),
            generated: self.generated.content.summary(),
            ground_truth: self.ground_truth.content.summary(),
            notes: self.notes.clone(),
        }
    }
}

/// Builds pages one item at a time. The generated image always goes through
/// the same scratch file, so items must not be assembled concurrently.
pub(crate) struct PageAssembler<'a> {
    source: &'a GroundTruthSource,
    schema: PlotSchema,
    plot_scratch: PathBuf,
}

impl<'a> PageAssembler<'a> {
    pub(crate) fn new(source: &'a GroundTruthSource, schema: PlotSchema, temp_folder: &Path) -> Self {
        Self {
            source,
            schema,
            plot_scratch: temp_folder.join(PLOT_SCRATCH_FILE),
        }
    }

    pub(crate) fn assemble_all(&self, results: &NormalizedResults) -> Vec<ReportPage> {
        results
            .ids()
            .iter()
            .filter_map(|id| results.records.get(id))
            .map(|record| self.assemble(record))
            .collect()
    }

    pub(crate) fn assemble(&self, record: &ResultRecord) -> ReportPage {
        let id = &record.id;
        let metrics = metric_lines(record);
        let mut notes = Vec::new();

        let ground_truth = self.source.resolve(id);
        if let Some(warning) = ground_truth.warning(id) {
            warn!(id = %id, source = self.source.name(), "{warning}");
            notes.push(warning);
        }
        if let Some(note) = ground_truth.ambiguity_note() {
            debug!(
                id = %id,
                extra = ground_truth.extra_candidates(),
                "ambiguous ground truth, keeping first candidate"
            );
            notes.push(note);
        }
        let ground_truth_ambiguous = ground_truth.is_ambiguous();
        let ground_truth_content = ground_truth_cell(id, &ground_truth);

        let generated_content = self.generated_cell(record);
        if let Some(reason) = generated_content.text() {
            debug!(id = %id, reason = %reason, "no generated image embedded");
        }

        ReportPage {
            id: id.clone(),
            metrics,
            notes,
            generated: ReportCell {
                caption: GENERATED_CAPTION,
                content: generated_content,
            },
            ground_truth: ReportCell {
                caption: GROUND_TRUTH_CAPTION,
                content: ground_truth_content,
            },
            ground_truth_ambiguous,
        }
    }

    fn generated_cell(&self, record: &ResultRecord) -> CellContent {
        let column = self.schema.column();
        let value = record.field(column);

        match self.schema {
            PlotSchema::SingleImage => match value {
                None | Some(Value::Null) => CellContent::Text(NO_IMAGE_GENERATED.to_string()),
                Some(Value::String(payload)) if payload.trim().is_empty() => {
                    CellContent::Text(NO_IMAGE_GENERATED.to_string())
                }
                Some(Value::String(payload)) => self.decode_and_embed(&record.id, payload),
                Some(other) => CellContent::Text(format!(
                    "Unexpected {column} type: {}",
                    json_type_name(other)
                )),
            },
            PlotSchema::MultiImage => match value {
                None | Some(Value::Null) => CellContent::Text(NO_IMAGE_GENERATED.to_string()),
                Some(Value::Array(plots)) => match plots.first() {
                    None => CellContent::Text(NO_IMAGES_EMPTY_LIST.to_string()),
                    Some(Value::String(payload))
                        if payload.chars().count() > MIN_PLAUSIBLE_PAYLOAD_CHARS =>
                    {
                        self.decode_and_embed(&record.id, payload)
                    }
                    Some(_) => CellContent::Text(INVALID_IMAGE_DATA.to_string()),
                },
                Some(other) => CellContent::Text(format!(
                    "Unexpected {column} type: {}",
                    json_type_name(other)
                )),
            },
        }
    }

    fn decode_and_embed(&self, id: &ItemId, payload: &str) -> CellContent {
        if let Err(err) = decode_to_file(payload, &self.plot_scratch) {
            warn!(id = %id, error = %err, "generated image failed to decode");
            return CellContent::Text(format!(
                "Error decoding image: {}",
                truncate_chars(&err.to_string(), MAX_ERROR_CHARS)
            ));
        }
        embed_or_explain(id, &self.plot_scratch)
    }
}

fn metric_lines(record: &ResultRecord) -> Vec<String> {
    METRIC_LINES
        .iter()
        .filter_map(|(field, label)| {
            record
                .metric(field)
                .map(|value| format!("{label} = {}", display_value(value)))
        })
        .collect()
}

/// Booleans print as `True`/`False`, matching earlier reports.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

fn ground_truth_cell(id: &ItemId, ground_truth: &GroundTruth) -> CellContent {
    match ground_truth {
        GroundTruth::Found { path, .. } => embed_or_explain(id, path),
        GroundTruth::Unavailable(_) => CellContent::Text(NO_GROUND_TRUTH.to_string()),
        GroundTruth::DecodeFailed { message, .. } => CellContent::Text(format!(
            "Error decoding image: {}",
            truncate_chars(message, MAX_ERROR_CHARS)
        )),
    }
}

fn embed_or_explain(id: &ItemId, path: &Path) -> CellContent {
    match load_embedded_image(path) {
        Ok(image) => CellContent::Image(image),
        Err(err) => {
            warn!(id = %id, path = %path.display(), error = %format!("{err:#}"), "image failed to embed");
            CellContent::Text(format!(
                "Error embedding image: {}",
                truncate_chars(&format!("{err:#}"), MAX_ERROR_CHARS)
            ))
        }
    }
}

/// Reads a decoded image back and probes it. PNG bytes are kept as-is;
/// other raster formats are converted because document media is stored as PNG.
pub(crate) fn load_embedded_image(path: &Path) -> Result<EmbeddedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let format = image::guess_format(&bytes).context("unrecognized image format")?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .context("failed to decode image data")?;

    let png = if format == ImageFormat::Png {
        bytes
    } else {
        let mut converted = Cursor::new(Vec::new());
        decoded
            .write_to(&mut converted, ImageFormat::Png)
            .context("failed to convert image to png")?;
        converted.into_inner()
    };

    Ok(EmbeddedImage {
        png,
        width_px: decoded.width(),
        height_px: decoded.height(),
    })
}
