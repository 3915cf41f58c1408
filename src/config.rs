//! Lock configuration.
//!
//! Configuration is layered: [`LockConfig::default`] gives the defaults,
//! [`LockConfig::from_env`] applies environment overrides on top, and the
//! `with_*` builders apply code-level overrides last.

use std::time::Duration;

/// Environment variable holding the stall warning threshold in milliseconds.
/// `off` or `none` disables the warning.
pub const ENV_STALL_WARN_MS: &str = "TICKETRW_STALL_WARN_MS";

/// Default stall warning threshold.
pub const DEFAULT_STALL_WARNING: Duration = Duration::from_secs(5);

/// Errors from configuration validation and loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The stall warning threshold must be non-zero.
    #[error("stall warning threshold must be non-zero")]
    ZeroStallThreshold,
    /// The lock name must be non-empty.
    #[error("lock name must be non-empty")]
    EmptyName,
    /// An environment variable held an unparsable value.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Settings for one [`TicketRwLock`](crate::TicketRwLock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Human-readable name used in log events and stats (e.g. "catalog").
    pub name: &'static str,
    /// Log a warning when a waiter has been blocked this long. `None` disables
    /// the warning.
    pub stall_warning: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            name: "ticket_rwlock",
            stall_warning: Some(DEFAULT_STALL_WARNING),
        }
    }
}

impl LockConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies environment overrides in place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var(ENV_STALL_WARN_MS) {
            self.stall_warning = parse_stall_warning(&raw)?;
        }
        Ok(())
    }

    /// Sets the lock name.
    #[must_use]
    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sets the stall warning threshold.
    #[must_use]
    pub const fn with_stall_warning(mut self, threshold: Duration) -> Self {
        self.stall_warning = Some(threshold);
        self
    }

    /// Disables the stall warning.
    #[must_use]
    pub const fn without_stall_warning(mut self) -> Self {
        self.stall_warning = None;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.stall_warning.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroStallThreshold);
        }
        Ok(())
    }
}

fn parse_stall_warning(raw: &str) -> Result<Option<Duration>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("off") || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidEnv {
            var: ENV_STALL_WARN_MS,
            value: raw.to_owned(),
        }),
        Ok(ms) => Ok(Some(Duration::from_millis(ms))),
    }
}
