//! Boundary script generation
//!
//! A boundary script is a small POSIX `sh` shim installed as a git hook. It
//! bakes in absolute paths at generation time and hands off to
//! `resguard check <phase>`, passing hook arguments and stdin through.
//! Nothing else needs to be running when git invokes it.

use std::path::Path;

use crate::evaluate::Phase;
use crate::storage::ProjectArchive;

/// Marker line prefix identifying hooks written by resguard
pub const HOOK_MARKER: &str = "# resguard-managed:";

/// Quote a value for POSIX `sh` using single quotes
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// True if a hook file's content was generated by resguard
pub fn is_managed_script(content: &str) -> bool {
    content
        .lines()
        .take(5)
        .any(|line| line.trim_start().starts_with(HOOK_MARKER))
}

/// Render the commit-time script for `archive`
pub fn render_precommit_script(archive: &ProjectArchive, binary: &Path) -> String {
    render_script(Phase::PreCommit, archive, binary)
}

/// Render the push-time script for `archive`
pub fn render_prepush_script(archive: &ProjectArchive, binary: &Path) -> String {
    render_script(Phase::PrePush, archive, binary)
}

/// Render the boundary script for a phase
pub fn render_script(phase: Phase, archive: &ProjectArchive, binary: &Path) -> String {
    let reservations = archive.file_reservations_dir();
    let mut check_args = format!(
        "--reservations-dir {}",
        shell_quote(&reservations.to_string_lossy())
    );
    if phase == Phase::PreCommit {
        check_args.push_str(&format!(
            " \\\n  --archive-root {}",
            shell_quote(&archive.root().to_string_lossy())
        ));
    }

    let hook = phase.hook_name();
    format!(
        r#"#!/bin/sh
{marker} {hook}
# Reservation boundary check for project '{slug}'.
# Generated by `resguard install`; reinstalling overwrites this file.
RESGUARD_BIN={binary}
if [ ! -x "$RESGUARD_BIN" ]; then
  echo "[{hook}] resguard binary not found at $RESGUARD_BIN; skipping reservation check." >&2
  exit 0
fi
exec "$RESGUARD_BIN" check {hook} {check_args} \
  "$@"
"#,
        marker = HOOK_MARKER,
        hook = hook,
        slug = archive.slug(),
        binary = shell_quote(&binary.to_string_lossy()),
        check_args = check_args,
    )
}
