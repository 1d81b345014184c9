//! Configuration management for fleetctl.
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (`FLEETCTL_*` prefix, highest precedence)
//! 2. `fleetctl.local.toml` (gitignored, local overrides)
//! 3. `fleetctl.toml` (git-tracked, project config)
//! 4. `~/.config/fleetctl/config.toml` (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The recognized surface mirrors the two components that are actually
//! configurable: the audit pipeline and the migration runner. Everything
//! else - store backend selection, reconcile cadence - is a caller
//! concern, not something this crate opines on.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Top-level fleetctl configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub audit: AuditConfig,
    pub migration: MigrationConfig,
}

/// Audit pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// When `false`, a no-op logger is installed and no events are
    /// ever recorded - every hook invocation behaves as `NoLog`.
    pub enabled: bool,

    /// SQLite busy-timeout, in seconds, for the audit event store.
    pub sqlite_timeout_secs: u64,

    /// Byte target for size-based cleanup of `audit_logs`; `0` disables
    /// cleanup entirely.
    pub max_size_bytes: u64,

    /// Probability in `[0.0, 1.0]` that a write triggers a cleanup
    /// sweep, rather than sweeping on every write.
    pub cleanup_probability: f64,

    /// Legacy newline-delimited-JSON log directory. When set, triggers
    /// a one-shot migration into the SQLite store on startup; `None`
    /// skips the legacy migration path entirely.
    pub legacy_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sqlite_timeout_secs: 30,
            max_size_bytes: 0,
            cleanup_probability: 0.01,
            legacy_path: None,
        }
    }
}

/// Migration runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Cap on the migration index to apply up to, inclusive; `0` means
    /// no cap (apply everything registered).
    pub max_version: u32,

    /// Optional name substring filter - only registered migrations
    /// whose name contains this string are eligible to run. Empty
    /// string matches everything.
    pub filter: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_version: 0,
            filter: String::new(),
        }
    }
}

impl FleetConfig {
    /// Load configuration from default locations.
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific project directory.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Resolves `audit.max_size_bytes == 0` and `migration.max_version == 0`
    /// into the `None`/unbounded sentinels the runtime types expect.
    pub fn audit_max_size(&self) -> Option<u64> {
        (self.audit.max_size_bytes > 0).then_some(self.audit.max_size_bytes)
    }

    pub fn migration_max_version(&self) -> Option<u32> {
        (self.migration.max_version > 0).then_some(self.migration.max_version)
    }

    pub fn migration_filter(&self) -> Option<&str> {
        (!self.migration.filter.is_empty()).then_some(self.migration.filter.as_str())
    }

    /// Checks the ranges `serde` can't express on its own. Called by
    /// `ConfigLoader::load` after merging every source, so a bad value in
    /// any layer - built-in default, user file, project file, env var -
    /// surfaces as the same error regardless of where it came from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.audit.cleanup_probability) {
            return Err(ConfigError::ValidationError(format!(
                "audit.cleanup_probability must be in [0.0, 1.0], got {}",
                self.audit.cleanup_probability
            )));
        }
        if self.audit.enabled && self.audit.sqlite_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "audit.sqlite_timeout_secs must be nonzero when audit.enabled is true".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_interface_surface() {
        let config = FleetConfig::default();
        assert!(config.audit.enabled);
        assert_eq!(config.audit.sqlite_timeout_secs, 30);
        assert_eq!(config.audit_max_size(), None);
        assert_eq!(config.migration_max_version(), None);
        assert_eq!(config.migration_filter(), None);
    }

    #[test]
    fn zero_is_the_uncapped_sentinel() {
        let mut config = FleetConfig::default();
        config.audit.max_size_bytes = 1024;
        config.migration.max_version = 5;
        config.migration.filter = "seed".into();
        assert_eq!(config.audit_max_size(), Some(1024));
        assert_eq!(config.migration_max_version(), Some(5));
        assert_eq!(config.migration_filter(), Some("seed"));
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(FleetConfig::default().validate().is_ok());
    }

    #[test]
    fn cleanup_probability_out_of_range_is_rejected() {
        let mut config = FleetConfig::default();
        config.audit.cleanup_probability = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        config.audit.cleanup_probability = -0.01;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn zero_timeout_only_rejected_when_audit_enabled() {
        let mut config = FleetConfig::default();
        config.audit.sqlite_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.audit.enabled = false;
        assert!(config.validate().is_ok());
    }
}
