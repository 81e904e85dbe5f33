//! Project archive layout
//!
//! Reservation records live in a per-project archive that resguard only
//! reads, plus a lock file that serializes hook installs.
//!
//! # Directory Structure
//!
//! ```text
//! <storage root>/
//!   projects/
//!     <slug>/                   # One archive per project
//!       .archive.lock           # Write lock for archive mutations
//!       file_reservations/      # Reservation records (external writer)
//!         <id>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::{self, ArchiveWriteGuard, DEFAULT_LOCK_TIMEOUT_MS};

/// Directory under the storage root holding all project archives
pub const PROJECTS_DIR: &str = "projects";

/// Directory inside a project archive holding reservation records
pub const FILE_RESERVATIONS_DIR: &str = "file_reservations";

/// Lock file inside a project archive
pub const ARCHIVE_LOCK_FILE: &str = ".archive.lock";

/// Turn a human project name into an archive directory name.
///
/// Lowercases, collapses every run of non-alphanumerics into `-`, and trims
/// dashes from both ends.
pub fn slugify(name: &str) -> Result<String> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "project name '{name}' has no usable characters"
        )));
    }
    Ok(slug)
}

/// Root of all project archives
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
    lock_timeout_ms: u64,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive directory for a project, without touching the filesystem
    pub fn project_root(&self, project: &str) -> Result<PathBuf> {
        Ok(self.root.join(PROJECTS_DIR).join(slugify(project)?))
    }

    /// Handle to a project archive without creating anything on disk.
    ///
    /// A relative storage root is resolved against the current directory so
    /// baked hook paths stay absolute.
    pub fn archive(&self, project: &str) -> Result<ProjectArchive> {
        let slug = slugify(project)?;
        let root = self.root.join(PROJECTS_DIR).join(&slug);
        let root = match root.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) if root.is_absolute() => root,
            Err(_) => std::env::current_dir()?.join(root),
        };

        Ok(ProjectArchive {
            slug,
            root,
            lock_timeout_ms: self.lock_timeout_ms,
        })
    }

    /// Create the project archive and its reservations directory if needed
    pub fn ensure_archive(&self, project: &str) -> Result<ProjectArchive> {
        let slug = slugify(project)?;
        let root = self.root.join(PROJECTS_DIR).join(&slug);
        fs::create_dir_all(root.join(FILE_RESERVATIONS_DIR))?;
        let root = root.canonicalize()?;
        debug!(project = %slug, root = %root.display(), "project archive ready");

        Ok(ProjectArchive {
            slug,
            root,
            lock_timeout_ms: self.lock_timeout_ms,
        })
    }
}

/// An existing project archive
#[derive(Debug, Clone)]
pub struct ProjectArchive {
    slug: String,
    root: PathBuf,
    lock_timeout_ms: u64,
}

impl ProjectArchive {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Absolute, canonical archive root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_reservations_dir(&self) -> PathBuf {
        self.root.join(FILE_RESERVATIONS_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_LOCK_FILE)
    }

    /// Take the archive write lock, waiting up to the configured timeout
    pub async fn write_lock(&self) -> Result<ArchiveWriteGuard> {
        lock::acquire_async(self.lock_path(), self.lock_timeout_ms).await
    }
}
