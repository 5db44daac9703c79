use std::fmt;
use std::path::{Component, Path};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Opaque benchmark item key, kept in its display form so it can name
/// ground-truth directories and key lookups regardless of the JSON type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::new(text.as_str()),
            other => Self::new(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id can be joined onto a folder without leaving it.
    pub fn is_single_path_component(&self) -> bool {
        let mut components = Path::new(&self.0).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) && !self.0.contains(['/', '\\'])
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cell of the columnar input for one row. `Absent` means the column
/// exists but carries no entry at this row's index.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Present(Value),
}

impl FieldValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Absent => None,
            Self::Present(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub id: ItemId,
    pub fields: IndexMap<String, FieldValue>,
}

impl ResultRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(FieldValue::as_value)
    }

    /// Metric lookup; a JSON null (serialized NaN) counts as missing.
    pub fn metric(&self, name: &str) -> Option<&Value> {
        self.field(name).filter(|value| !value.is_null())
    }
}

/// Which generated-image column a results file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotSchema {
    SingleImage,
    MultiImage,
}

impl PlotSchema {
    pub fn column(self) -> &'static str {
        match self {
            Self::SingleImage => "plot_b64",
            Self::MultiImage => "plots_generated",
        }
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactPaths {
    pub bench_file: String,
    pub results_file: String,
    pub dataset_folder: String,
    pub dataset_split: Option<String>,
    pub document: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportCounts {
    pub item_count: usize,
    pub generated_embedded: usize,
    pub ground_truth_embedded: usize,
    pub ground_truth_ambiguous: usize,
    pub items_with_warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub id: ItemId,
    pub generated: String,
    pub ground_truth: String,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub ground_truth_source: String,
    pub plot_schema: PlotSchema,
    pub results_sha256: String,
    pub paths: ArtifactPaths,
    pub counts: ReportCounts,
    pub items: Vec<ItemOutcome>,
}
