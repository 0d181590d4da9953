//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`OidcConfig`](groupgate_access::OidcConfig) for identity provider
//! configuration. Roles are configured as comma-separated lists:
//!
//! ```text
//! ROLES__GROUPS__ADMIN=5a1f...,77c2...
//! ROLES__INHERITS__ADMIN=support,user
//! ```

use std::collections::HashMap;

use chrono::TimeDelta;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use groupgate_access::{
    AccessPolicy, ConfigurationError, InheritanceConfig, OidcConfig, RoleConfig, StalenessPolicy,
};
use rootcause::prelude::Report;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Seconds after which resolved roles require a new login. 0 disables.
    #[serde(default)]
    pub role_refresh_interval_seconds: u64,

    /// Seconds without a request before a session is inactive. 0 disables.
    #[serde(default)]
    pub session_max_idle_seconds: u64,

    /// Keep raw member group ids in the session and show them on `/me`.
    #[serde(default)]
    pub debug_group_ids: bool,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Identity provider configuration.
    pub oidc: OidcConfig,

    /// Role to group and role inheritance mappings.
    #[serde(default)]
    pub roles: RolesConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1:8000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Absolute session lifetime in the store, in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    480
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

/// Upper bound for `session.duration_minutes` (one year).
pub const MAX_SESSION_DURATION_MINUTES: i64 = 60 * 24 * 365;

impl SessionConfig {
    /// Returns the session lifetime, or `None` if it does not fit a duration.
    #[must_use]
    pub fn lifetime(&self) -> Option<TimeDelta> {
        TimeDelta::try_minutes(self.duration_minutes)
    }

    /// Checks the session settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidSetting` when the duration is not
    /// in `1..=MAX_SESSION_DURATION_MINUTES` or the cleanup interval is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(1..=MAX_SESSION_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(ConfigurationError::InvalidSetting {
                key: "session.duration_minutes".to_string(),
                reason: format!(
                    "{} is outside 1..={MAX_SESSION_DURATION_MINUTES}",
                    self.duration_minutes
                ),
            });
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(ConfigurationError::InvalidSetting {
                key: "session.cleanup_interval_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

/// Role mappings as read from the environment.
///
/// Keys are role names; values are comma-separated lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolesConfig {
    /// Role name to granting group ids.
    #[serde(default)]
    pub groups: HashMap<String, String>,

    /// Role name to implied role names.
    #[serde(default)]
    pub inherits: HashMap<String, String>,
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl RolesConfig {
    /// Builds the role to groups mapping.
    #[must_use]
    pub fn role_config(&self) -> RoleConfig {
        let mut config = RoleConfig::new();
        for (role, groups) in &self.groups {
            config.insert(role, split_list(groups));
        }
        config
    }

    /// Builds the inheritance mapping.
    #[must_use]
    pub fn inheritance_config(&self) -> InheritanceConfig {
        let mut config = InheritanceConfig::new();
        for (role, implied) in &self.inherits {
            config.insert(role, split_list(implied));
        }
        config
    }

    /// Builds and validates the access policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured groups exceed the provider lookup limit.
    pub fn access_policy(&self) -> Result<AccessPolicy, Report<ConfigurationError>> {
        AccessPolicy::new(self.role_config(), self.inheritance_config())
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(config::Config::builder().add_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true),
        ))
    }

    /// Builds configuration from a prepared builder.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn load(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Checks settings that would otherwise only fail once requests arrive.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), Report<ConfigurationError>> {
        self.session.validate()?;
        Ok(())
    }

    /// Returns the staleness thresholds.
    #[must_use]
    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy::new(
            self.role_refresh_interval_seconds,
            self.session_max_idle_seconds,
        )
    }
}
