//! Import of the legacy single-file layout.
//!
//! The legacy file is one JSON object keyed by collection name, e.g.
//! `{"licenses": [...], "systems": {"documents": [...]}}`. It is read once
//! and copied into the per-collection layout; it is never written back.
//!
//! # Invariants
//! - Collections that already hold documents are skipped, never merged.
//! - The whole import commits in one transaction or not at all.
//! - Importing either side of the License/System relationship repairs it in
//!   that same transaction.

use crate::model::document::Document;
use crate::model::relation::{LICENSES, SYSTEMS};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Backend;
use crate::sync::{repair, RepairReport};
use log::{info, warn};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Outcome of one legacy import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Collection name and number of documents copied.
    pub imported: Vec<(String, usize)>,
    /// Collections left alone because they were not empty.
    pub skipped: Vec<String>,
    /// Relationship repair run after Licenses or Systems were imported.
    pub repair: Option<RepairReport>,
}

impl ImportReport {
    pub fn total_imported(&self) -> usize {
        self.imported.iter().map(|(_, count)| count).sum()
    }
}

/// Copies every collection of the legacy file at `path` into `backend`.
pub fn import_legacy_combined<B: Backend>(path: &Path, backend: &B) -> StoreResult<ImportReport> {
    let location = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|err| StoreError::Io {
        location: location.clone(),
        message: err.to_string(),
    })?;
    let corruption = |message: String| StoreError::Corruption {
        location: location.clone(),
        message,
    };
    let root: Value = serde_json::from_str(&raw).map_err(|err| corruption(err.to_string()))?;
    let Value::Object(sections) = root else {
        return Err(corruption("legacy file must be a JSON object".to_string()));
    };

    let mut incoming: Vec<(String, Vec<Document>)> = Vec::with_capacity(sections.len());
    for (name, section) in sections {
        let items = match section {
            Value::Array(items) => items,
            Value::Object(mut wrapper) => match wrapper.remove("documents") {
                Some(Value::Array(items)) => items,
                _ => return Err(corruption(format!("`{name}` has no documents array"))),
            },
            _ => return Err(corruption(format!("`{name}` is not a collection"))),
        };
        let docs = items
            .into_iter()
            .map(Document::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| corruption(format!("`{name}`: {err}")))?;
        incoming.push((name, docs));
    }

    let mut names: Vec<String> = incoming.iter().map(|(name, _)| name.clone()).collect();
    let relational = names.iter().any(|name| name == LICENSES || name == SYSTEMS);
    if relational {
        for side in [LICENSES, SYSTEMS] {
            if !names.iter().any(|name| name == side) {
                names.push(side.to_string());
            }
        }
    }
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let report = backend.transact(&name_refs, |workspace| {
        let mut report = ImportReport::default();
        for (name, docs) in incoming {
            let set = workspace.collection_mut(&name)?;
            if !set.is_empty() {
                warn!(
                    "event=legacy_import module=store status=skip collection={} existing={}",
                    name,
                    set.len()
                );
                report.skipped.push(name);
                continue;
            }
            let count = set.restore_many(docs)?;
            report.imported.push((name, count));
        }

        let touched_relationship = report
            .imported
            .iter()
            .any(|(name, _)| name == LICENSES || name == SYSTEMS);
        if touched_relationship {
            let (licenses, systems) = workspace.pair_mut(LICENSES, SYSTEMS)?;
            report.repair = Some(repair(licenses, systems));
        }
        Ok(report)
    })?;

    info!(
        "event=legacy_import module=store status=ok path={} imported={} skipped={}",
        location,
        report.total_imported(),
        report.skipped.len()
    );
    Ok(report)
}
