//! Git plumbing for the boundary checks and the hook installer.
//!
//! This module covers:
//! - Changed-path inspection behind [`ChangeInspector`], backed by git
//!   subprocesses ([`GitCli`]) so hooks see exactly what git is about to do
//! - Pre-push ref-update parsing
//! - Hooks directory resolution through libgit2
//!
//! Inspection is fail-open: a failing git call contributes no paths and the
//! check carries on with whatever was collected.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{ErrorCode, Repository};
use tracing::debug;

use crate::error::{Error, Result};

/// Remote assumed when a pre-push hook gets no remote name
pub const DEFAULT_REMOTE: &str = "origin";

/// Staged diff with rename (`-M`) and copy (`-C`) detection
const NAME_STATUS_ARGS: &[&str] = &["diff", "--cached", "--name-status", "-M", "-C", "-z"];

/// Diff filter for added, copied, modified, renamed, deleted, type-changed, unmerged
const DIFF_FILTER: &str = "--diff-filter=ACMRDTU";

// =============================================================================
// Changed path sets
// =============================================================================

/// Insertion-ordered set of repository-relative paths
#[derive(Debug, Clone, Default)]
pub struct ChangedPaths {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl ChangedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; empty strings and repeats are ignored
    pub fn insert(&mut self, path: impl Into<String>) {
        let path = path.into();
        if path.is_empty() || self.seen.contains(&path) {
            return;
        }
        self.seen.insert(path.clone());
        self.ordered.push(path);
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

impl Extend<String> for ChangedPaths {
    fn extend<T: IntoIterator<Item = String>>(&mut self, iter: T) {
        for path in iter {
            self.insert(path);
        }
    }
}

impl FromIterator<String> for ChangedPaths {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        let mut paths = ChangedPaths::new();
        paths.extend(iter);
        paths
    }
}

// =============================================================================
// Ref updates (pre-push stdin)
// =============================================================================

/// One `<local ref> <local oid> <remote ref> <remote oid>` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub local_ref: String,
    pub local_oid: String,
    pub remote_ref: String,
    pub remote_oid: String,
}

impl RefUpdate {
    /// Parse a single line; lines with fewer than four fields are ignored
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let local_ref = fields.next()?;
        let local_oid = fields.next()?;
        let remote_ref = fields.next()?;
        let remote_oid = fields.next()?;
        Some(Self {
            local_ref: local_ref.to_string(),
            local_oid: local_oid.to_string(),
            remote_ref: remote_ref.to_string(),
            remote_oid: remote_oid.to_string(),
        })
    }

    /// The remote does not have this ref yet
    pub fn is_new_on_remote(&self) -> bool {
        is_absent_oid(&self.remote_oid)
    }

    /// The push deletes the remote ref
    pub fn is_deletion(&self) -> bool {
        is_absent_oid(&self.local_oid)
    }
}

/// Parse all ref updates from pre-push stdin
pub fn parse_ref_updates(input: &str) -> Vec<RefUpdate> {
    input.lines().filter_map(RefUpdate::parse_line).collect()
}

/// Empty or all-zero object ids mark the absent side of a ref update
pub fn is_absent_oid(oid: &str) -> bool {
    oid.chars().all(|c| c == '0')
}

// =============================================================================
// Change inspection
// =============================================================================

/// Source of candidate paths for a boundary check
pub trait ChangeInspector {
    /// Paths staged for the next commit, with both names of renames and copies
    fn staged_paths(&self) -> Vec<String>;

    /// Paths touched by the commits a push would send to `remote`
    fn pushed_paths(&self, updates: &[RefUpdate], remote: &str) -> Vec<String>;
}

/// [`ChangeInspector`] backed by the `git` executable
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    dir: Option<PathBuf>,
}

impl GitCli {
    /// Run git in the current directory, as hooks do
    pub fn new() -> Self {
        Self::default()
    }

    /// Run git against a specific checkout
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Run git once; any failure is logged and reported as `None`
    fn run(&self, args: &[&str]) -> Option<Vec<u8>> {
        let mut cmd = Command::new("git");
        if let Some(dir) = &self.dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args);

        match cmd.output() {
            Ok(output) if output.status.success() => Some(output.stdout),
            Ok(output) => {
                debug!(
                    args = ?args,
                    status = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "git command failed"
                );
                None
            }
            Err(err) => {
                debug!(args = ?args, error = %err, "failed to spawn git");
                None
            }
        }
    }

    fn commits_to_push(&self, local_oid: &str, remote: &str) -> Option<Vec<String>> {
        let remotes = format!("--remotes={remote}");
        let stdout = self.run(&["rev-list", "--topo-order", local_oid, "--not", &remotes])?;
        Some(
            String::from_utf8_lossy(&stdout)
                .lines()
                .map(str::trim)
                .filter(|sha| !sha.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn commit_paths(&self, sha: &str) -> Vec<String> {
        self.run(&[
            "diff-tree",
            "-r",
            "--root",
            "--no-commit-id",
            "--name-only",
            "--no-ext-diff",
            DIFF_FILTER,
            "-z",
            sha,
        ])
        .map(|stdout| split_nul(&stdout))
        .unwrap_or_default()
    }

    /// Coarse range diff used when commit enumeration is unavailable
    fn range_paths(&self, update: &RefUpdate) -> Vec<String> {
        let stdout = if update.is_new_on_remote() {
            self.run(&["log", "--format=", "--name-only", "-z", &update.local_oid])
        } else {
            self.run(&[
                "diff",
                "--name-only",
                "-z",
                &update.remote_oid,
                &update.local_oid,
            ])
        };
        stdout
            .map(|stdout| {
                split_nul(&stdout)
                    .into_iter()
                    .map(|path| path.trim_matches('\n').to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ChangeInspector for GitCli {
    fn staged_paths(&self) -> Vec<String> {
        let mut paths = ChangedPaths::new();

        let Some(names) = self.run(&["diff", "--cached", "--name-only", "-z", DIFF_FILTER]) else {
            return paths.into_vec();
        };
        paths.extend(split_nul(&names));

        let Some(statuses) = self.run(NAME_STATUS_ARGS) else {
            return paths.into_vec();
        };
        paths.extend(parse_name_status(&split_nul(&statuses)));

        paths.into_vec()
    }

    fn pushed_paths(&self, updates: &[RefUpdate], remote: &str) -> Vec<String> {
        let mut paths = ChangedPaths::new();

        for update in updates {
            if update.is_deletion() {
                continue;
            }
            match self.commits_to_push(&update.local_oid, remote) {
                Some(commits) => {
                    for sha in commits {
                        paths.extend(self.commit_paths(&sha));
                    }
                }
                None => {
                    debug!(local = %update.local_oid, "commit enumeration failed; using range diff");
                    paths.extend(self.range_paths(update));
                }
            }
        }

        paths.into_vec()
    }
}

/// Split NUL-separated git output, dropping empty fields
pub fn split_nul(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .split('\0')
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}

/// Flatten `--name-status -z` fields into paths.
///
/// Rename (`R…`) and copy (`C…`) entries carry two paths; both are kept.
pub fn parse_name_status(fields: &[String]) -> Vec<String> {
    let mut paths = Vec::new();
    let mut iter = fields.iter();

    while let Some(status) = iter.next() {
        let takes = if status.starts_with('R') || status.starts_with('C') {
            2
        } else {
            1
        };
        for _ in 0..takes {
            match iter.next() {
                Some(path) => paths.push(path.clone()),
                None => break,
            }
        }
    }

    paths
}

// =============================================================================
// Repository discovery and hooks directory
// =============================================================================

/// Discover a git repository from a starting path.
pub fn discover_repo(start: &Path) -> Result<Repository> {
    Repository::discover(start).map_err(|err| {
        if err.code() == ErrorCode::NotFound {
            Error::NotARepo(start.to_path_buf())
        } else {
            Error::Git(err)
        }
    })
}

/// Resolve where git hooks for the checkout at `repo_path` live.
///
/// Precedence:
/// 1. `core.hooksPath`, relative values taken from the checkout's top level
/// 2. `<git dir>/hooks`; for a linked worktree this is its private git dir
/// 3. `<repo_path>/.git/hooks`
pub fn resolve_hooks_dir(repo_path: &Path) -> PathBuf {
    match discover_repo(repo_path) {
        Ok(repo) => hooks_dir_for(&repo, repo_path),
        Err(err) => {
            debug!(repo = %repo_path.display(), error = %err, "falling back to .git/hooks");
            repo_path.join(".git").join("hooks")
        }
    }
}

fn hooks_dir_for(repo: &Repository, repo_path: &Path) -> PathBuf {
    if let Some(configured) = configured_hooks_path(repo) {
        if is_absolute_hooks_path(&configured) {
            return configured;
        }
        let top_level = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo_path.to_path_buf());
        return top_level.join(configured);
    }

    repo.path().join("hooks")
}

fn configured_hooks_path(repo: &Repository) -> Option<PathBuf> {
    let config = repo.config().ok()?;
    config
        .get_path("core.hooksPath")
        .ok()
        .filter(|path| !path.as_os_str().is_empty())
}

/// Absolute on this platform, or a Windows drive path such as `C:/hooks`
fn is_absolute_hooks_path(path: &Path) -> bool {
    if path.is_absolute() {
        return true;
    }
    let raw = path.to_string_lossy();
    let bytes = raw.as_bytes();
    bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}
