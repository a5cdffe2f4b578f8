//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
///
/// Only the watchdog is tunable; validator thresholds are protocol
/// constants and live in `qoe-core`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Resident-memory ceiling in KiB; the run aborts beyond it.
    pub memory_ceiling_kib: u64,
    /// How many ingested lines between watchdog checks.
    pub memcheck_interval_lines: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("memory_ceiling_kib", &self.memory_ceiling_kib)
            .field("memcheck_interval_lines", &self.memcheck_interval_lines)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_ceiling_kib: 12 * 1024 * 1024, // 12 GiB
            memcheck_interval_lines: 1_000_000,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (QOE_*)
        figment = figment.merge(Env::prefixed("QOE_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for qoe.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("qoe"))
}
