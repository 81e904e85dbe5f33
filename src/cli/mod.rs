//! Command-line interface for resguard
//!
//! This module defines the CLI structure using clap derive macros.
//! `check` is what installed hooks run; the rest manage the hooks.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::ENV_STORAGE_ROOT;
use crate::error::Result;
use crate::evaluate::Phase;
use crate::output::OutputOptions;

mod check;
mod install;

/// resguard - file-reservation guards for git worktrees
///
/// Installs commit and push hooks that stop an agent from committing or
/// pushing files another agent has reserved.
#[derive(Parser, Debug)]
#[command(name = "resguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root of the per-project archives
    #[arg(long, global = true, env = ENV_STORAGE_ROOT)]
    pub storage_root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a reservation boundary check (used by installed hooks)
    #[command(subcommand)]
    Check(CheckCommands),

    /// Install the reservation guard into a checkout
    Install {
        /// Project whose reservations the guard enforces (slug or path)
        project: String,

        /// Path to the checkout (worktree) to guard
        repo: PathBuf,

        /// Also install the pre-push guard
        #[arg(long)]
        prepush: bool,
    },

    /// Remove resguard-managed hooks from a checkout
    Uninstall {
        /// Path to the checkout
        repo: PathBuf,
    },

    /// Print a generated hook script without installing it
    Render {
        /// Which hook to render
        #[arg(value_enum)]
        hook: HookKind,

        /// Project whose reservations the script enforces
        project: String,
    },

    /// Print the hooks directory resolved for a checkout
    HooksDir {
        /// Path to the checkout
        repo: PathBuf,
    },
}

/// Check subcommands
#[derive(Subcommand, Debug)]
pub enum CheckCommands {
    /// Check staged changes (git pre-commit)
    PreCommit {
        #[command(flatten)]
        target: CheckTarget,
    },

    /// Check commits about to be pushed (git pre-push, ref updates on stdin)
    PrePush {
        #[command(flatten)]
        target: CheckTarget,

        /// Remote being pushed to
        remote: Option<String>,

        /// URL of the remote (accepted for hook compatibility)
        url: Option<String>,
    },

    /// Check an explicit list of paths with commit-time rules
    Paths {
        #[command(flatten)]
        target: CheckTarget,

        /// Read NUL-separated paths from stdin instead of lines
        #[arg(long)]
        stdin_nul: bool,

        /// Paths to check (read from stdin when omitted)
        paths: Vec<String>,
    },
}

/// Where a check finds reservations and which checkout it inspects
#[derive(Args, Debug, Clone, Default)]
pub struct CheckTarget {
    /// Directory of reservation records
    #[arg(long)]
    pub reservations_dir: Option<PathBuf>,

    /// Project archive root; reservations are read from its file_reservations/
    #[arg(long)]
    pub archive_root: Option<PathBuf>,

    /// Project slug or path, resolved under the storage root
    #[arg(long)]
    pub project: Option<String>,

    /// Checkout to inspect (defaults to current directory)
    #[arg(long)]
    pub repo: Option<PathBuf>,
}

/// Hook kinds accepted by `render`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreCommit,
    PrePush,
}

impl From<HookKind> for Phase {
    fn from(kind: HookKind) -> Self {
        match kind {
            HookKind::PreCommit => Phase::PreCommit,
            HookKind::PrePush => Phase::PrePush,
        }
    }
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn run(self) -> Result<i32> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Check(cmd) => match cmd {
                CheckCommands::PreCommit { target } => check::run(check::CheckOptions {
                    phase: Phase::PreCommit,
                    target,
                    input: check::CheckInput::Staged,
                    storage_root: self.storage_root,
                }),
                CheckCommands::PrePush { target, remote, url: _ } => {
                    check::run(check::CheckOptions {
                        phase: Phase::PrePush,
                        target,
                        input: check::CheckInput::PushStdin { remote },
                        storage_root: self.storage_root,
                    })
                }
                CheckCommands::Paths {
                    target,
                    stdin_nul,
                    paths,
                } => check::run(check::CheckOptions {
                    phase: Phase::PreCommit,
                    target,
                    input: check::CheckInput::Paths { paths, stdin_nul },
                    storage_root: self.storage_root,
                }),
            },
            Commands::Install {
                project,
                repo,
                prepush,
            } => install::run_install(install::InstallOptions {
                project,
                repo,
                prepush,
                storage_root: self.storage_root,
                output,
            }),
            Commands::Uninstall { repo } => install::run_uninstall(repo, output),
            Commands::Render { hook, project } => install::run_render(install::RenderOptions {
                phase: hook.into(),
                project,
                storage_root: self.storage_root,
                output,
            }),
            Commands::HooksDir { repo } => install::run_hooks_dir(repo, output),
        }
    }
}
