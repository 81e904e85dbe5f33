//! resguard check command implementation
//!
//! Entry point for installed hooks. Everything this writes goes to stderr;
//! git hooks must keep stdout clean.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use crate::check::{run_check, Candidates};
use crate::cli::CheckTarget;
use crate::config::{GuardConfig, Settings};
use crate::error::{exit_codes, Error, Result};
use crate::evaluate::Phase;
use crate::git::{parse_ref_updates, GitCli, DEFAULT_REMOTE};
use crate::snapshot::ReservationDir;
use crate::storage::{ArchiveStore, FILE_RESERVATIONS_DIR};

/// Where candidate paths come from for this invocation
#[derive(Debug)]
pub enum CheckInput {
    Staged,
    PushStdin { remote: Option<String> },
    Paths { paths: Vec<String>, stdin_nul: bool },
}

pub struct CheckOptions {
    pub phase: Phase,
    pub target: CheckTarget,
    pub input: CheckInput,
    pub storage_root: Option<PathBuf>,
}

pub fn run(options: CheckOptions) -> Result<i32> {
    let config = GuardConfig::from_env();
    let reservations = resolve_reservations_dir(&options.target, options.storage_root.as_deref())?;
    let inspector = match &options.target.repo {
        Some(repo) => GitCli::in_dir(repo),
        None => GitCli::new(),
    };

    let candidates = match options.input {
        CheckInput::Staged => Candidates::Staged,
        CheckInput::PushStdin { remote } => Candidates::Pushed {
            updates: parse_ref_updates(&read_stdin()),
            remote: remote
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
        },
        CheckInput::Paths { paths, stdin_nul } => {
            if paths.is_empty() && !io::stdin().is_terminal() {
                Candidates::Explicit(split_path_list(&read_stdin(), stdin_nul))
            } else {
                Candidates::Explicit(paths)
            }
        }
    };

    let mut stderr = io::stderr().lock();
    let result = run_check(
        &config,
        options.phase,
        candidates,
        &ReservationDir::new(reservations),
        &inspector,
        Utc::now(),
        &mut stderr,
    );

    match result {
        Ok(outcome) => {
            debug!(phase = %options.phase, outcome = ?outcome, "check finished");
            Ok(outcome.exit_code())
        }
        // Already reported on the diagnostic stream.
        Err(Error::MissingAgent(_)) => Ok(exit_codes::GUARD_FAILURE),
        Err(err) => Err(err),
    }
}

/// Reservation directory from, in order: `--reservations-dir`,
/// `--archive-root`, `--project` under the storage root
fn resolve_reservations_dir(
    target: &CheckTarget,
    storage_root: Option<&std::path::Path>,
) -> Result<PathBuf> {
    if let Some(dir) = &target.reservations_dir {
        return Ok(dir.clone());
    }
    if let Some(root) = &target.archive_root {
        return Ok(root.join(FILE_RESERVATIONS_DIR));
    }
    if let Some(project) = &target.project {
        let settings = Settings::load_default()?;
        let root = settings.resolve_storage_root(storage_root)?;
        return Ok(ArchiveStore::new(root)
            .project_root(project)?
            .join(FILE_RESERVATIONS_DIR));
    }
    Err(Error::InvalidArgument(
        "one of --reservations-dir, --archive-root or --project is required".to_string(),
    ))
}

/// Read all of stdin; a read failure yields nothing
fn read_stdin() -> String {
    let mut buf = Vec::new();
    if let Err(err) = io::stdin().lock().read_to_end(&mut buf) {
        debug!(error = %err, "failed to read stdin");
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn split_path_list(raw: &str, nul: bool) -> Vec<String> {
    let separator = if nul { '\0' } else { '\n' };
    raw.split(separator)
        .map(|item| item.trim_end_matches('\r'))
        .filter(|item| !item.trim().is_empty())
        .map(str::to_string)
        .collect()
}
