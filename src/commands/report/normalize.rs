use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{FieldValue, ItemId, PlotSchema, ResultRecord};

pub(crate) const ID_FIELD: &str = "id";

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum NormalizeError {
    #[error("malformed results file: top-level value is not an object")]
    NotAnObject,
    #[error("malformed results file: missing `id` field")]
    MissingIdField,
    #[error("malformed results file: `id` field is not an index->value object")]
    InvalidIdField,
}

/// Row-oriented view of a columnar results file, keyed by item ID in row order.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedResults {
    pub(crate) schema: PlotSchema,
    pub(crate) records: IndexMap<ItemId, ResultRecord>,
}

impl NormalizedResults {
    pub(crate) fn ids(&self) -> Vec<ItemId> {
        self.records.keys().cloned().collect()
    }
}

pub(crate) fn load_results(path: &Path) -> Result<NormalizedResults> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let columnar: Value = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let normalized = normalize_results(&columnar)
        .with_context(|| format!("failed to normalize {}", path.display()))?;
    info!(
        records = normalized.records.len(),
        schema = normalized.schema.column(),
        "normalized results"
    );
    Ok(normalized)
}

/// Transposes `{field: {index: value}}` into `{id: {field: value}}`.
///
/// Rows are enumerated from the `id` column in ascending index order. A
/// column without an entry for some row yields `FieldValue::Absent` there.
/// A later row with a repeated ID replaces the earlier record but keeps its
/// position.
pub(crate) fn normalize_results(columnar: &Value) -> Result<NormalizedResults, NormalizeError> {
    let columns = columnar.as_object().ok_or(NormalizeError::NotAnObject)?;
    let id_column = columns
        .get(ID_FIELD)
        .ok_or(NormalizeError::MissingIdField)?
        .as_object()
        .ok_or(NormalizeError::InvalidIdField)?;

    let schema = detect_schema(columns);
    let mut indices = id_column.keys().collect::<Vec<_>>();
    indices.sort_by(|a, b| compare_positional(a, b));

    let mut records = IndexMap::with_capacity(indices.len());
    for index in indices {
        let id = ItemId::from_json(&id_column[index.as_str()]);

        let mut fields = IndexMap::with_capacity(columns.len().saturating_sub(1));
        for (name, column) in columns {
            if name == ID_FIELD {
                continue;
            }
            let value = match column {
                Value::Object(cells) => cells
                    .get(index.as_str())
                    .cloned()
                    .map_or(FieldValue::Absent, FieldValue::Present),
                _ => FieldValue::Absent,
            };
            fields.insert(name.clone(), value);
        }

        if records.contains_key(&id) {
            warn!(id = %id, index = %index, "duplicate item id in results, later row wins");
        }
        records.insert(id.clone(), ResultRecord { id, fields });
    }

    for (name, column) in columns {
        if name != ID_FIELD && !column.is_object() {
            warn!(field = %name, "results column is not an index->value object, treated as absent");
        }
    }

    Ok(NormalizedResults { schema, records })
}

fn detect_schema(columns: &Map<String, Value>) -> PlotSchema {
    let multi = columns.contains_key(PlotSchema::MultiImage.column());
    let single = columns.contains_key(PlotSchema::SingleImage.column());
    if multi && single {
        warn!("results carry both plot_b64 and plots_generated, using plots_generated");
    }
    if multi {
        PlotSchema::MultiImage
    } else {
        PlotSchema::SingleImage
    }
}

/// Numeric indices in numeric order, anything else after them lexically.
fn compare_positional(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
