//! Point-in-time reservation snapshots.
//!
//! The reservation directory is written concurrently by an external
//! component, so reads take no lock. A record that cannot be read or decoded
//! is left out and reported as a [`SkippedRecord`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::reservation::ReservationRecord;

/// Extension of reservation record files
pub const RECORD_EXTENSION: &str = "json";

/// Why a record file was left out of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The file vanished or could not be read as UTF-8
    Unreadable,
    /// The content is not a reservation object
    Malformed,
}

/// A record file excluded from the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub path: PathBuf,
    pub reason: SkipReason,
    pub detail: String,
}

/// Immutable, file-name ordered view of the live reservation records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<ReservationRecord>,
    skipped: Vec<SkippedRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<ReservationRecord>) -> Self {
        Self {
            records,
            skipped: Vec::new(),
        }
    }

    pub fn records(&self) -> &[ReservationRecord] {
        &self.records
    }

    pub fn skipped(&self) -> &[SkippedRecord] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Anything that can produce a reservation snapshot.
///
/// `None` means the reservation store does not exist at all, which turns the
/// whole boundary check into a no-op.
pub trait SnapshotSource {
    fn load(&self) -> Option<Snapshot>;
}

/// A flat directory of `*.json` reservation records
#[derive(Debug, Clone)]
pub struct ReservationDir {
    dir: PathBuf,
}

impl ReservationDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotSource for ReservationDir {
    fn load(&self) -> Option<Snapshot> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "reservation directory absent");
                return None;
            }
            Err(err) => {
                debug!(dir = %self.dir.display(), error = %err, "reservation directory unreadable");
                return Some(Snapshot::default());
            }
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext == RECORD_EXTENSION)
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort();

        let mut snapshot = Snapshot::default();
        for path in candidates {
            match read_record(&path) {
                Ok(record) => snapshot.records.push(record),
                Err(skipped) => {
                    debug!(
                        path = %skipped.path.display(),
                        reason = ?skipped.reason,
                        detail = %skipped.detail,
                        "skipping reservation record"
                    );
                    snapshot.skipped.push(skipped);
                }
            }
        }

        Some(snapshot)
    }
}

fn read_record(path: &Path) -> Result<ReservationRecord, SkippedRecord> {
    let content = fs::read_to_string(path).map_err(|err| SkippedRecord {
        path: path.to_path_buf(),
        reason: SkipReason::Unreadable,
        detail: err.to_string(),
    })?;

    ReservationRecord::from_json(&content).map_err(|err| SkippedRecord {
        path: path.to_path_buf(),
        reason: SkipReason::Malformed,
        detail: err.to_string(),
    })
}
