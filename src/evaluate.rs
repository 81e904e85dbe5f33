//! Conflict evaluation.
//!
//! [`find_conflicts`] is a pure function of the snapshot, the acting agent,
//! the candidate paths, the phase and the clock. Gating, bypass and reporting
//! live in [`crate::check`].
//!
//! The two phases deliberately differ:
//! - `pre-commit` considers every live reservation and compares raw strings.
//! - `pre-push` ignores shared (`exclusive: false`) reservations and
//!   normalises separators and leading slashes on both sides first.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::GuardMode;
use crate::error::{exit_codes, Error, Result};
use crate::reservation::{patterns_overlap, ReservationRecord};
use crate::snapshot::Snapshot;

// =============================================================================
// Phase
// =============================================================================

/// Git lifecycle point a boundary check runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    PreCommit,
    PrePush,
}

impl Phase {
    /// File name of the git hook for this phase
    pub fn hook_name(&self) -> &'static str {
        match self {
            Phase::PreCommit => "pre-commit",
            Phase::PrePush => "pre-push",
        }
    }

    /// The git operation this phase guards, for messages
    pub fn operation(&self) -> &'static str {
        match self {
            Phase::PreCommit => "commit",
            Phase::PrePush => "push",
        }
    }

    /// Whether shared reservations take part in this phase
    pub fn considers(&self, record: &ReservationRecord) -> bool {
        match self {
            Phase::PreCommit => true,
            Phase::PrePush => record.exclusive,
        }
    }

    fn prepare_pattern(&self, pattern: &str) -> Option<String> {
        let pattern = match self {
            Phase::PreCommit => pattern.to_string(),
            Phase::PrePush => normalize_push_path(pattern.trim()),
        };
        (!pattern.trim().is_empty()).then_some(pattern)
    }

    fn overlaps(&self, pattern: &str, path: &str) -> bool {
        match self {
            Phase::PreCommit => patterns_overlap(pattern, path),
            Phase::PrePush => {
                let path = normalize_push_path(path);
                pattern == path || patterns_overlap(pattern, &path)
            }
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pre-commit" | "precommit" | "commit" => Ok(Phase::PreCommit),
            "pre-push" | "prepush" | "push" => Ok(Phase::PrePush),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid phase '{}'. Expected: pre-commit, pre-push",
                s
            ))),
        }
    }
}

fn normalize_push_path(raw: &str) -> String {
    raw.replace('\\', "/").trim_start_matches('/').to_string()
}

// =============================================================================
// Conflicts
// =============================================================================

/// A candidate path colliding with another agent's reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub path: String,
    pub holder: Option<String>,
    pub pattern: String,
}

impl Conflict {
    pub fn new(path: impl Into<String>, holder: Option<&str>, pattern: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            holder: holder.map(str::to_string),
            pattern: pattern.into(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} matches file reservation '{}' held by {}",
            self.path,
            self.pattern,
            self.holder.as_deref().unwrap_or("<unowned>")
        )
    }
}

/// Find every (path, holder, pattern) collision for the acting agent.
///
/// Records held by `agent`, expired records and records the phase ignores are
/// skipped. Output order is snapshot order, then candidate order.
pub fn find_conflicts(
    snapshot: &Snapshot,
    agent: &str,
    paths: &[String],
    phase: Phase,
    now: DateTime<Utc>,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for record in snapshot.records() {
        if record.is_held_by(agent) || !phase.considers(record) || record.is_expired(now) {
            continue;
        }
        let Some(pattern) = record
            .path_pattern
            .as_deref()
            .and_then(|raw| phase.prepare_pattern(raw))
        else {
            continue;
        };

        for path in paths {
            if phase.overlaps(&pattern, path) {
                conflicts.push(Conflict::new(
                    path.clone(),
                    record.agent.as_deref(),
                    pattern.clone(),
                ));
            }
        }
    }

    conflicts
}

// =============================================================================
// Verdict
// =============================================================================

/// Policy outcome of a set of conflicts under a mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clear,
    Advisory(Vec<Conflict>),
    Blocked(Vec<Conflict>),
}

impl Verdict {
    pub fn from_conflicts(conflicts: Vec<Conflict>, mode: GuardMode) -> Self {
        if conflicts.is_empty() {
            Verdict::Clear
        } else if mode.is_advisory() {
            Verdict::Advisory(conflicts)
        } else {
            Verdict::Blocked(conflicts)
        }
    }

    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            Verdict::Clear => &[],
            Verdict::Advisory(conflicts) | Verdict::Blocked(conflicts) => conflicts,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Blocked(_) => exit_codes::GUARD_FAILURE,
            Verdict::Clear | Verdict::Advisory(_) => exit_codes::SUCCESS,
        }
    }
}
