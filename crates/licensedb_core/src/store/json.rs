//! Flat-file backend: one JSON file per collection.
//!
//! # Responsibility
//! - Serialize writers per collection (in-process gate + lock file).
//! - Load, mutate and commit collections as whole files.
//! - Detect writers that bypassed the lock via the file revision.
//!
//! # Invariants
//! - Multi-collection locks are taken in sorted name order.
//! - A commit re-reads each dirty file's revision before replacing it; a
//!   mismatch aborts the whole transaction with `Conflict`.
//! - All dirty files are staged before any is renamed into place.

use crate::config::BackendKind;
use crate::store::error::{StoreError, StoreResult};
use crate::store::file::{
    collection_path, commit_staged, read_collection, stage_collection, sync_dir, CollectionLock,
};
use crate::store::set::DocumentSet;
use crate::store::{lock_order, validate_collection_name, Backend, Workspace};
use log::{debug, error, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

type Gate = Arc<Mutex<()>>;

/// File-per-collection store rooted at one directory.
#[derive(Debug)]
pub struct JsonBackend {
    data_dir: PathBuf,
    lock_timeout: Duration,
    gates: Mutex<HashMap<String, Gate>>,
}

struct OpenedCollection {
    name: String,
    path: PathBuf,
    revision: u64,
}

impl JsonBackend {
    /// Opens (and creates if needed) the data directory.
    pub fn open(data_dir: impl AsRef<Path>, lock_timeout: Duration) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        info!(
            "event=store_open module=store status=start backend=json data_dir={}",
            data_dir.display()
        );
        fs::create_dir_all(&data_dir).map_err(|err| {
            error!(
                "event=store_open module=store status=error backend=json error_code=create_dir_failed error={}",
                err
            );
            StoreError::WriteFailure {
                location: data_dir.display().to_string(),
                message: err.to_string(),
            }
        })?;
        info!("event=store_open module=store status=ok backend=json");

        Ok(Self {
            data_dir,
            lock_timeout,
            gates: Mutex::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file backing `collection`.
    pub fn collection_file(&self, collection: &str) -> PathBuf {
        collection_path(&self.data_dir, collection)
    }

    fn gate(&self, collection: &str) -> Gate {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load(&self, name: &str) -> StoreResult<(OpenedCollection, DocumentSet)> {
        let path = self.collection_file(name);
        let loaded = read_collection(&path).map_err(|err| {
            if let StoreError::Corruption { location, message } = &err {
                error!(
                    "event=store_corruption module=store status=error collection={} path={} error={}",
                    name, location, message
                );
            }
            err
        })?;
        let set = DocumentSet::load(name, loaded.documents).map_err(|message| {
            error!(
                "event=store_corruption module=store status=error collection={} path={} error={}",
                name,
                path.display(),
                message
            );
            StoreError::Corruption {
                location: path.display().to_string(),
                message,
            }
        })?;
        Ok((
            OpenedCollection {
                name: name.to_string(),
                path,
                revision: loaded.revision,
            },
            set,
        ))
    }

    fn commit(&self, opened: &[OpenedCollection], sets: &[DocumentSet]) -> StoreResult<()> {
        let dirty: Vec<(&OpenedCollection, &DocumentSet)> = opened
            .iter()
            .zip(sets)
            .filter(|(_, set)| set.is_dirty())
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }

        for (meta, _) in &dirty {
            let found = read_collection(&meta.path)?.revision;
            if found != meta.revision {
                error!(
                    "event=collection_commit module=store status=error error_code=conflict collection={} expected={} found={}",
                    meta.name, meta.revision, found
                );
                return Err(StoreError::Conflict {
                    collection: meta.name.clone(),
                    expected: meta.revision,
                    found,
                });
            }
        }

        let mut staged: Vec<(PathBuf, &OpenedCollection)> = Vec::with_capacity(dirty.len());
        for (meta, set) in &dirty {
            match stage_collection(&meta.path, meta.revision + 1, set.documents()) {
                Ok(tmp_path) => staged.push((tmp_path, *meta)),
                Err(err) => {
                    for (tmp_path, _) in &staged {
                        let _ = fs::remove_file(tmp_path);
                    }
                    return Err(err);
                }
            }
        }

        let mut pending = staged.into_iter();
        while let Some((tmp_path, meta)) = pending.next() {
            if let Err(err) = commit_staged(&tmp_path, &meta.path) {
                for (rest, _) in pending {
                    let _ = fs::remove_file(rest);
                }
                return Err(err);
            }
            debug!(
                "event=collection_commit module=store status=ok collection={} revision={}",
                meta.name,
                meta.revision + 1
            );
        }
        sync_dir(&self.data_dir)
    }
}

fn lock_all(gates: &[Gate]) -> Vec<MutexGuard<'_, ()>> {
    gates
        .iter()
        .map(|gate| gate.lock().unwrap_or_else(PoisonError::into_inner))
        .collect()
}

impl Backend for JsonBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Json
    }

    fn read<T, F>(&self, collection: &str, read: F) -> StoreResult<T>
    where
        F: FnOnce(&DocumentSet) -> StoreResult<T>,
    {
        validate_collection_name(collection)?;
        let gate = self.gate(collection);
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, set) = self.load(collection)?;
        read(&set)
    }

    fn transact<T, F>(&self, collections: &[&str], body: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Workspace) -> StoreResult<T>,
    {
        let started_at = Instant::now();
        let names = lock_order(collections)?;
        let gates: Vec<Gate> = names.iter().map(|name| self.gate(name)).collect();
        let _guards = lock_all(&gates);
        let _locks = names
            .iter()
            .map(|name| CollectionLock::acquire(&self.collection_file(name), self.lock_timeout))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut opened = Vec::with_capacity(names.len());
        let mut sets = Vec::with_capacity(names.len());
        for name in &names {
            let (meta, set) = self.load(name)?;
            opened.push(meta);
            sets.push(set);
        }

        let mut workspace = Workspace::new(sets);
        let value = body(&mut workspace)?;
        let sets = workspace.into_sets();
        self.commit(&opened, &sets)?;

        debug!(
            "event=store_transact module=store status=ok backend=json collections={} duration_ms={}",
            names.join(","),
            started_at.elapsed().as_millis()
        );
        Ok(value)
    }
}
