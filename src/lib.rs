//! resguard - File Reservation Guards Library
//!
//! Enforces file reservations held by parallel agents at git commit and push
//! time, across independent worktrees of one repository.
//!
//! # Core Concepts
//!
//! - **Reservations**: JSON records claiming a glob of paths for one agent,
//!   optionally exclusive and time-bounded
//! - **Boundary checks**: evaluate staged or pushed paths against a snapshot
//!   of live reservations held by other agents
//! - **Boundary scripts**: `sh` hooks baked with absolute archive paths that
//!   run the check when git commits or pushes
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Guard switches from the environment, settings from `resguard.toml`
//! - `error`: Error types, result alias and exit codes
//! - `reservation`: Reservation records, expiry and glob matching
//! - `snapshot`: Lock-free loading of the reservation directory
//! - `evaluate`: Conflict detection per phase
//! - `check`: Gate, bypass and identity rules around an evaluation
//! - `git`: Changed-path inspection and hooks directory resolution
//! - `script`: Boundary script generation
//! - `install`: Hook installation and removal
//! - `storage`: Project archive layout
//! - `lock`: File locking and atomic writes
//! - `output`: Human and JSON report formatting

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod git;
pub mod install;
pub mod lock;
pub mod output;
pub mod reservation;
pub mod script;
pub mod snapshot;
pub mod storage;

pub use error::{Error, Result};
