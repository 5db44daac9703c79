use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::{info, warn};

use super::codec::decode_to_file;
use crate::model::{ItemId, json_type_name};

pub(crate) const PLOTS_GT_FIELD: &str = "plots_gt";
pub(crate) const GT_SCRATCH_FILE: &str = "gt_plot.png";

/// Reference-image lookup, selected once per run.
#[derive(Debug)]
pub(crate) enum GroundTruthSource {
    Folder(FolderSource),
    DatasetSplit(DatasetSplitSource),
}

/// `<root>/<id>/<pattern>`, first match in glob order.
#[derive(Debug)]
pub(crate) struct FolderSource {
    root: PathBuf,
    pattern: String,
}

/// Preloaded `id -> plots_gt` index of a dataset split. The canonical
/// payload is decoded into one scratch file reused across items.
#[derive(Debug)]
pub(crate) struct DatasetSplitSource {
    entries: HashMap<ItemId, Option<Value>>,
    scratch_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Unavailable {
    NoImages { dir: PathBuf },
    UnsafeId,
    NotInSplit,
    NoPlotsInEntry,
    UnexpectedShape(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GroundTruth {
    Found { path: PathBuf, candidates: usize },
    Unavailable(Unavailable),
    DecodeFailed { message: String, candidates: usize },
}

impl GroundTruth {
    pub(crate) fn candidates(&self) -> usize {
        match self {
            Self::Found { candidates, .. } | Self::DecodeFailed { candidates, .. } => *candidates,
            Self::Unavailable(_) => 0,
        }
    }

    pub(crate) fn is_ambiguous(&self) -> bool {
        self.candidates() > 1
    }

    pub(crate) fn extra_candidates(&self) -> usize {
        self.candidates().saturating_sub(1)
    }

    /// Header line written when nothing can be shown on the right side.
    pub(crate) fn warning(&self, id: &ItemId) -> Option<String> {
        match self {
            Self::Found { .. } => None,
            Self::Unavailable(Unavailable::NoImages { .. }) => {
                Some(format!("Warning: No ground truth image found for ID {id}"))
            }
            Self::Unavailable(Unavailable::UnsafeId) => Some(format!(
                "Warning: ID {id} cannot name a ground truth directory"
            )),
            Self::Unavailable(Unavailable::NotInSplit) => {
                Some(format!("Warning: ID {id} not found in dataset split"))
            }
            Self::Unavailable(Unavailable::NoPlotsInEntry) => Some(format!(
                "Warning: Dataset entry for ID {id} has no {PLOTS_GT_FIELD} images"
            )),
            Self::Unavailable(Unavailable::UnexpectedShape(kind)) => Some(format!(
                "Warning: {PLOTS_GT_FIELD} for ID {id} has unexpected type {kind}"
            )),
            Self::DecodeFailed { .. } => Some(format!(
                "Warning: Ground truth image for ID {id} could not be decoded"
            )),
        }
    }

    pub(crate) fn ambiguity_note(&self) -> Option<String> {
        self.is_ambiguous().then(|| {
            format!(
                "Note: Found {} images in GT, using the first one",
                self.candidates()
            )
        })
    }
}

impl GroundTruthSource {
    pub(crate) fn folder(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::Folder(FolderSource {
            root: root.into(),
            pattern: pattern.into(),
        })
    }

    pub(crate) fn dataset_split(
        entries: HashMap<ItemId, Option<Value>>,
        scratch_dir: &Path,
    ) -> Self {
        Self::DatasetSplit(DatasetSplitSource {
            entries,
            scratch_path: scratch_dir.join(GT_SCRATCH_FILE),
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Folder(_) => "folder",
            Self::DatasetSplit(_) => "dataset-split",
        }
    }

    pub(crate) fn resolve(&self, id: &ItemId) -> GroundTruth {
        match self {
            Self::Folder(source) => source.resolve(id),
            Self::DatasetSplit(source) => source.resolve(id),
        }
    }
}

impl FolderSource {
    fn resolve(&self, id: &ItemId) -> GroundTruth {
        if !id.is_single_path_component() {
            warn!(id = %id, "item id would escape the dataset folder");
            return GroundTruth::Unavailable(Unavailable::UnsafeId);
        }
        let dir = self.root.join(id.as_str());
        let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join(&self.pattern);

        let mut matches = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths
                .filter_map(Result::ok)
                .filter(|path| path.is_file())
                .collect::<Vec<_>>(),
            Err(err) => {
                warn!(id = %id, pattern = %self.pattern, error = %err, "invalid ground truth glob");
                Vec::new()
            }
        };

        if matches.is_empty() {
            return GroundTruth::Unavailable(Unavailable::NoImages { dir });
        }

        let candidates = matches.len();
        GroundTruth::Found {
            path: matches.swap_remove(0),
            candidates,
        }
    }
}

impl DatasetSplitSource {
    fn resolve(&self, id: &ItemId) -> GroundTruth {
        let Some(entry) = self.entries.get(id) else {
            return GroundTruth::Unavailable(Unavailable::NotInSplit);
        };

        let plots = match entry {
            None | Some(Value::Null) => {
                return GroundTruth::Unavailable(Unavailable::NoPlotsInEntry);
            }
            Some(Value::Array(plots)) => plots,
            Some(other) => {
                return GroundTruth::Unavailable(Unavailable::UnexpectedShape(json_type_name(
                    other,
                )));
            }
        };

        let Some(first) = plots.first() else {
            return GroundTruth::Unavailable(Unavailable::NoPlotsInEntry);
        };
        let Some(payload) = first.as_str() else {
            return GroundTruth::Unavailable(Unavailable::UnexpectedShape(json_type_name(first)));
        };

        let candidates = plots.len();
        match decode_to_file(payload, &self.scratch_path) {
            Ok(()) => GroundTruth::Found {
                path: self.scratch_path.clone(),
                candidates,
            },
            Err(err) => GroundTruth::DecodeFailed {
                message: err.to_string(),
                candidates,
            },
        }
    }
}

/// Indexes a locally exported dataset split (JSON array or JSON lines) by
/// its `id` field. Records without an `id` are skipped.
pub(crate) fn load_dataset_split(path: &Path) -> Result<HashMap<ItemId, Option<Value>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset split {}", path.display()))?;

    let records = if raw.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<Value>>(&raw)
            .with_context(|| format!("failed to parse dataset split {}", path.display()))?
    } else {
        let mut records = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<Value>(line).with_context(|| {
                format!(
                    "failed to parse dataset split {} line {}",
                    path.display(),
                    line_no + 1
                )
            })?;
            records.push(record);
        }
        records
    };

    let index = index_split_records(records);
    if index.is_empty() {
        bail!("dataset split {} has no records with an id", path.display());
    }

    info!(path = %path.display(), entries = index.len(), "indexed dataset split");
    Ok(index)
}

pub(crate) fn index_split_records(records: Vec<Value>) -> HashMap<ItemId, Option<Value>> {
    let mut index = HashMap::with_capacity(records.len());
    let mut skipped = 0usize;

    for mut record in records {
        let Some(object) = record.as_object_mut() else {
            skipped += 1;
            continue;
        };
        let Some(id) = object.get("id").map(ItemId::from_json) else {
            skipped += 1;
            continue;
        };
        let plots = object.remove(PLOTS_GT_FIELD);
        if index.insert(id.clone(), plots).is_some() {
            warn!(id = %id, "duplicate id in dataset split, later record wins");
        }
    }

    if skipped > 0 {
        warn!(skipped, "dataset split records without an id were skipped");
    }
    index
}
