//! Boundary checks as run from git hooks.
//!
//! [`run_check`] applies the gate, bypass and identity rules, loads a
//! snapshot, collects candidate paths and writes the verdict to a diagnostic
//! stream. Checks run in this order and stop at the first that decides the
//! outcome:
//!
//! 1. enable gate off: no-op
//! 2. bypass on: notice, success
//! 3. no acting agent: fatal [`crate::error::Error::MissingAgent`]
//! 4. reservation directory absent: no-op, git is never consulted
//! 5. no candidate paths: no-op
//! 6. evaluate and report

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::{GuardConfig, ENV_BYPASS, ENV_MODE};
use crate::error::{exit_codes, Result};
use crate::evaluate::{find_conflicts, Conflict, Phase, Verdict};
use crate::git::{ChangeInspector, ChangedPaths, RefUpdate};
use crate::snapshot::SnapshotSource;

/// Where a check gets its candidate paths from
#[derive(Debug, Clone)]
pub enum Candidates {
    /// Staged changes in the current checkout
    Staged,
    /// Commits a push would send
    Pushed {
        updates: Vec<RefUpdate>,
        remote: String,
    },
    /// A caller-supplied list
    Explicit(Vec<String>),
}

/// Result of one boundary check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "conflicts", rename_all = "snake_case")]
pub enum CheckOutcome {
    Disabled,
    Bypassed,
    NoReservations,
    NoChanges,
    Clear,
    Advisory(Vec<Conflict>),
    Blocked(Vec<Conflict>),
}

impl CheckOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckOutcome::Blocked(_) => exit_codes::GUARD_FAILURE,
            _ => exit_codes::SUCCESS,
        }
    }

    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            CheckOutcome::Advisory(conflicts) | CheckOutcome::Blocked(conflicts) => conflicts,
            _ => &[],
        }
    }
}

impl From<Verdict> for CheckOutcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Clear => CheckOutcome::Clear,
            Verdict::Advisory(conflicts) => CheckOutcome::Advisory(conflicts),
            Verdict::Blocked(conflicts) => CheckOutcome::Blocked(conflicts),
        }
    }
}

/// Run one boundary check, writing human diagnostics to `diag`.
///
/// Only a missing agent identity is an error; every other situation is an
/// outcome. `diag` is stderr in the hook binary.
pub fn run_check<S, I, W>(
    config: &GuardConfig,
    phase: Phase,
    candidates: Candidates,
    source: &S,
    inspector: &I,
    now: DateTime<Utc>,
    diag: &mut W,
) -> Result<CheckOutcome>
where
    S: SnapshotSource + ?Sized,
    I: ChangeInspector + ?Sized,
    W: Write + ?Sized,
{
    if !config.enabled {
        debug!(%phase, "guard disabled");
        return Ok(CheckOutcome::Disabled);
    }

    if config.bypass {
        writeln!(diag, "[{phase}] bypass enabled via {ENV_BYPASS}=1")?;
        return Ok(CheckOutcome::Bypassed);
    }

    let agent = match config.require_agent() {
        Ok(agent) => agent,
        Err(err) => {
            writeln!(diag, "[{phase}] {err}")?;
            return Err(err);
        }
    };

    let Some(snapshot) = source.load() else {
        return Ok(CheckOutcome::NoReservations);
    };
    if !snapshot.skipped().is_empty() {
        debug!(%phase, skipped = snapshot.skipped().len(), "some reservation records were skipped");
    }

    let paths = match candidates {
        Candidates::Staged => inspector.staged_paths(),
        Candidates::Pushed { updates, remote } => inspector.pushed_paths(&updates, &remote),
        Candidates::Explicit(paths) => paths.into_iter().collect::<ChangedPaths>().into_vec(),
    };
    if paths.is_empty() {
        return Ok(CheckOutcome::NoChanges);
    }
    debug!(%phase, agent, candidates = paths.len(), records = snapshot.len(), "evaluating");

    let conflicts = find_conflicts(&snapshot, agent, &paths, phase, now);
    let outcome = CheckOutcome::from(Verdict::from_conflicts(conflicts, config.mode));
    report(phase, &outcome, diag)?;
    Ok(outcome)
}

fn report<W: Write + ?Sized>(phase: Phase, outcome: &CheckOutcome, diag: &mut W) -> Result<()> {
    let conflicts = outcome.conflicts();
    if conflicts.is_empty() {
        return Ok(());
    }

    writeln!(diag, "[{phase}] Exclusive file reservation conflicts detected:")?;
    for conflict in conflicts {
        writeln!(diag, "  - {conflict}")?;
    }

    match outcome {
        CheckOutcome::Advisory(_) => writeln!(
            diag,
            "[{phase}] Advisory mode: not blocking {} (set {ENV_MODE}=block to enforce).",
            phase.operation()
        )?,
        _ => {
            let doing = match phase {
                Phase::PreCommit => "committing",
                Phase::PrePush => "pushing",
            };
            writeln!(
                diag,
                "Resolve conflicts or release file reservations before {doing}."
            )?
        }
    }
    Ok(())
}

/// Map a check result onto a process exit code, as hooks expect
pub fn exit_code_for(result: &Result<CheckOutcome>) -> i32 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => err.exit_code(),
    }
}
