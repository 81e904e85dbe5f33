//! Configuration loading and management
//!
//! Two layers:
//! - [`GuardConfig`]: the hook-time switches, read once from the environment
//!   when a boundary check starts and passed explicitly from then on.
//! - [`Settings`]: install-time tool settings from an optional `resguard.toml`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Enable gate. Anything outside the truthy set leaves the guard a no-op.
pub const ENV_ENABLED: &str = "WORKTREES_ENABLED";

/// `block` (default) or `warn` / `advisory` / `adv`.
pub const ENV_MODE: &str = "AGENT_MAIL_GUARD_MODE";

/// Emergency bypass, same truthy set as the gate.
pub const ENV_BYPASS: &str = "AGENT_MAIL_BYPASS";

/// Identity of the acting agent. Required once the gate is on.
pub const ENV_AGENT: &str = "AGENT_NAME";

/// Overrides the archive storage root for the CLI.
pub const ENV_STORAGE_ROOT: &str = "RESGUARD_STORAGE_ROOT";

/// Points at an explicit `resguard.toml`.
pub const ENV_CONFIG: &str = "RESGUARD_CONFIG";

/// Name of the settings file inside the platform config directory
pub const SETTINGS_FILE: &str = "resguard.toml";

/// Returns true for `1`, `true`, `t`, `yes`, `y` (trimmed, any case).
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "y"
    )
}

// =============================================================================
// Guard Mode
// =============================================================================

/// Whether conflicts fail the operation or are only reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    /// Conflicts fail the commit/push
    #[default]
    Block,
    /// Conflicts are printed, the operation proceeds
    Warn,
}

impl GuardMode {
    /// Parse a raw mode value. Unknown and empty values fall back to `Block`.
    pub fn parse(raw: Option<&str>) -> Self {
        let value = raw.map(|v| v.trim().to_lowercase()).unwrap_or_default();
        match value.as_str() {
            "warn" | "advisory" | "adv" => GuardMode::Warn,
            _ => GuardMode::Block,
        }
    }

    pub fn is_advisory(&self) -> bool {
        matches!(self, GuardMode::Warn)
    }
}

impl fmt::Display for GuardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardMode::Block => write!(f, "block"),
            GuardMode::Warn => write!(f, "warn"),
        }
    }
}

// =============================================================================
// Guard Config (environment)
// =============================================================================

/// Immutable per-invocation guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuardConfig {
    pub enabled: bool,
    pub mode: GuardMode,
    pub bypass: bool,
    /// `None` when the variable is unset or empty
    pub agent: Option<String>,
}

impl GuardConfig {
    /// Read the guard switches from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(ENV_ENABLED).map(|v| is_truthy(&v)).unwrap_or(false);
        let mode = GuardMode::parse(lookup(ENV_MODE).as_deref());
        let bypass = lookup(ENV_BYPASS).map(|v| is_truthy(&v)).unwrap_or(false);
        let agent = lookup(ENV_AGENT).filter(|name| !name.is_empty());

        Self {
            enabled,
            mode,
            bypass,
            agent,
        }
    }

    /// The acting agent, or the fatal configuration error
    pub fn require_agent(&self) -> Result<&str> {
        self.agent
            .as_deref()
            .ok_or(Error::MissingAgent(ENV_AGENT))
    }
}

// =============================================================================
// Settings (resguard.toml)
// =============================================================================

/// Install-time settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root of the per-project archives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,

    /// How long an install waits for the project write lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Binary baked into generated hooks (defaults to the running executable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,
}

fn default_lock_timeout_ms() -> u64 {
    crate::lock::DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            binary: None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `$RESGUARD_CONFIG` or the platform config dir; defaults when absent
    pub fn load_default() -> Result<Self> {
        let path = std::env::var_os(ENV_CONFIG)
            .map(PathBuf::from)
            .or_else(default_settings_path);

        match path {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Pick the storage root: explicit override, then file, then platform data dir
    pub fn resolve_storage_root(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = &self.storage_root {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("archive"))
            .ok_or_else(|| {
                Error::InvalidConfig(
                    "cannot determine a storage root; pass --storage-root".to_string(),
                )
            })
    }

    /// The binary path that generated hooks will exec
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(root) = &self.storage_root {
            if root.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(
                    "storage_root cannot be empty".to_string(),
                ));
            }
        }
        if let Some(binary) = &self.binary {
            if !binary.is_absolute() {
                return Err(Error::InvalidConfig(format!(
                    "binary must be an absolute path (got '{}')",
                    binary.display()
                )));
            }
        }
        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "resguard")
}

fn default_settings_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}
