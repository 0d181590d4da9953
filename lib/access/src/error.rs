//! Error types for the access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AuthenticationError`: Identity provider and callback failures
//! - `AuthorizationError`: Role gate denials (401/403 split)
//! - `ConfigurationError`: Startup-time role configuration failures

use std::fmt;

/// Errors from authentication operations.
///
/// These are the only errors that cross the core boundary: they surface to
/// the callback handler, which reports a generic authentication failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// OIDC token validation failed.
    InvalidToken { reason: String },
    /// The callback state did not match the state issued at login.
    StateMismatch,
    /// OIDC provider error.
    ProviderError { provider: String, reason: String },
    /// Missing required claim in token.
    MissingClaim { claim: String },
    /// More group ids were requested than the provider accepts per lookup.
    GroupBatchTooLarge { requested: usize, limit: usize },
    /// The group membership lookup returned a failure status.
    GroupLookupFailed { status: u16 },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::StateMismatch => {
                write!(f, "callback state does not match login state")
            }
            Self::ProviderError { provider, reason } => {
                write!(f, "identity provider '{provider}' error: {reason}")
            }
            Self::MissingClaim { claim } => {
                write!(f, "missing required claim: {claim}")
            }
            Self::GroupBatchTooLarge { requested, limit } => {
                write!(
                    f,
                    "group lookup of {requested} ids exceeds the batch limit of {limit}"
                )
            }
            Self::GroupLookupFailed { status } => {
                write!(f, "group membership lookup failed with status {status}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from role gate evaluation.
///
/// `NotAuthenticated` and `SessionExpired` map to HTTP 401; the remaining
/// variants map to HTTP 403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No user in the session.
    NotAuthenticated,
    /// Session roles are outdated or the session has been idle too long.
    SessionExpired,
    /// ALL-mode gate: at least one required role is missing.
    MissingRequiredRoles { missing: Vec<String> },
    /// ANY-mode gate: none of the accepted roles are held.
    NoAcceptableRole { accepted: Vec<String> },
}

impl AuthorizationError {
    /// Returns true for the 401 class (authentication required).
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::SessionExpired)
    }

    /// Returns the user-facing message for this denial.
    ///
    /// Role names are deliberately left out; they go to logs only.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "Not authenticated",
            Self::SessionExpired => "Session expired or inactive; please log in again",
            Self::MissingRequiredRoles { .. } => "Forbidden (missing required roles)",
            Self::NoAcceptableRole { .. } => "Forbidden (no acceptable role)",
        }
    }
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => {
                write!(f, "user is not authenticated")
            }
            Self::SessionExpired => {
                write!(f, "session expired or inactive")
            }
            Self::MissingRequiredRoles { missing } => {
                write!(f, "missing required roles: {}", missing.join(", "))
            }
            Self::NoAcceptableRole { accepted } => {
                write!(f, "none of the accepted roles held: {}", accepted.join(", "))
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors detected while loading role configuration at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Distinct configured group ids exceed the provider batch-lookup limit.
    TooManyGroups { count: usize, limit: usize },
    /// A configuration value could not be used.
    InvalidSetting { key: String, reason: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyGroups { count, limit } => {
                write!(
                    f,
                    "{count} distinct group ids configured, provider lookup accepts at most {limit}"
                )
            }
            Self::InvalidSetting { key, reason } => {
                write!(f, "invalid setting '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}
