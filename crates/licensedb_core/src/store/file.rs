//! Collection file I/O and cross-process collection locks.
//!
//! # Responsibility
//! - Read/write one collection file: `{"revision": n, "documents": [...]}`.
//! - Stage writes in temp files so a commit is a rename.
//! - Guard each collection with an advisory lock on a `<file>.lock` sibling.
//!
//! # Invariants
//! - A missing file reads as an empty collection at revision 0.
//! - Unparseable content, blank files and objects without `documents` are
//!   reported as corruption, never as empty.
//! - The OS releases a lock when its holder exits, so a lock file left behind
//!   by a killed writer never blocks later writers.

use crate::model::document::Document;
use crate::store::error::{StoreError, StoreResult};
use chrono::Utc;
use fs2::FileExt;
use log::warn;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const LOCK_RETRY_MIN: Duration = Duration::from_millis(2);
const LOCK_RETRY_MAX: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct CollectionFile {
    #[serde(default)]
    revision: u64,
    documents: Vec<Document>,
}

#[derive(Serialize)]
struct CollectionFileRef<'a> {
    revision: u64,
    documents: &'a [Document],
}

/// Persisted state of one collection.
#[derive(Debug, Default)]
pub struct LoadedCollection {
    pub revision: u64,
    pub documents: Vec<Document>,
    pub existed: bool,
}

pub fn collection_path(data_dir: &Path, collection: &str) -> PathBuf {
    data_dir.join(format!("{collection}.json"))
}

pub fn lock_path(path: &Path) -> PathBuf {
    suffixed(path, ".lock")
}

/// Reads a collection file.
pub fn read_collection(path: &Path) -> StoreResult<LoadedCollection> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LoadedCollection::default()),
        Err(err) => {
            return Err(StoreError::Io {
                location: path.display().to_string(),
                message: err.to_string(),
            })
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(StoreError::Corruption {
            location: path.display().to_string(),
            message: "collection file is blank".to_string(),
        });
    }

    let parsed: CollectionFile =
        serde_json::from_slice(&bytes).map_err(|err| StoreError::Corruption {
            location: path.display().to_string(),
            message: err.to_string(),
        })?;

    Ok(LoadedCollection {
        revision: parsed.revision,
        documents: parsed.documents,
        existed: true,
    })
}

/// Writes `documents` to a temp sibling of `path` and fsyncs it.
///
/// Returns the temp path; [`commit_staged`] moves it into place.
pub fn stage_collection(path: &Path, revision: u64, documents: &[Document]) -> StoreResult<PathBuf> {
    let tmp_path = suffixed(path, &format!(".tmp.{}.{}", std::process::id(), unique_suffix()));
    let write_failure = |err: &dyn std::fmt::Display| StoreError::WriteFailure {
        location: tmp_path.display().to_string(),
        message: err.to_string(),
    };

    let result = (|| -> StoreResult<()> {
        let file = File::create(&tmp_path).map_err(|err| write_failure(&err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(
            &mut writer,
            &CollectionFileRef {
                revision,
                documents,
            },
        )
        .map_err(|err| write_failure(&err))?;
        writer.write_all(b"\n").map_err(|err| write_failure(&err))?;
        let file = writer.into_inner().map_err(|err| write_failure(&err))?;
        file.sync_all().map_err(|err| write_failure(&err))?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(tmp_path)
}

/// Atomically replaces `path` with a staged temp file.
pub fn commit_staged(tmp_path: &Path, path: &Path) -> StoreResult<()> {
    fs::rename(tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(tmp_path);
        StoreError::WriteFailure {
            location: path.display().to_string(),
            message: err.to_string(),
        }
    })
}

/// Fsyncs a directory so completed renames survive a crash.
pub fn sync_dir(dir: &Path) -> StoreResult<()> {
    let failure = |err: std::io::Error| StoreError::WriteFailure {
        location: dir.display().to_string(),
        message: err.to_string(),
    };
    // Directories cannot be opened for sync on every platform.
    if cfg!(unix) {
        File::open(dir).map_err(failure)?.sync_all().map_err(failure)?;
    }
    Ok(())
}

/// Exclusive cross-process lock on one collection file.
///
/// The lock file itself stays on disk; only the advisory lock on it matters.
#[derive(Debug)]
pub struct CollectionLock {
    file: File,
}

impl CollectionLock {
    /// Locks the `<path>.lock` sibling, retrying until `timeout` elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> StoreResult<Self> {
        let lock_path = lock_path(path);
        let write_failure = |err: io::Error| StoreError::WriteFailure {
            location: lock_path.display().to_string(),
            message: err.to_string(),
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(write_failure)?;

        let started_at = Instant::now();
        let mut backoff = LOCK_RETRY_MIN;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(err) if is_contended(&err) => {
                    if started_at.elapsed() >= timeout {
                        warn!(
                            "event=lock_busy module=store status=error lock_path={} waited_ms={}",
                            lock_path.display(),
                            started_at.elapsed().as_millis()
                        );
                        return Err(StoreError::LockBusy {
                            lock_path: lock_path.display().to_string(),
                        });
                    }
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(LOCK_RETRY_MAX);
                }
                Err(err) => return Err(write_failure(err)),
            }
        }

        let mut lock = Self { file };
        lock.record_holder();
        Ok(lock)
    }

    // Best effort; nothing reads this back.
    fn record_holder(&mut self) {
        if self.file.set_len(0).is_ok() {
            let _ = writeln!(
                self.file,
                "pid={}\nutc={}",
                std::process::id(),
                Utc::now().to_rfc3339()
            );
        }
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    err.kind() == ErrorKind::WouldBlock
        || (err.raw_os_error().is_some() && err.raw_os_error() == contended.raw_os_error())
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
