//! Identity of the signed-in principal.
//!
//! The identity is copied from the provider's ID token at callback time and
//! stored in the session as an opaque value. Authorization never looks at it
//! beyond its presence.

use serde::{Deserialize, Serialize};

/// Identity claims kept in the session for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Display name (from the `name` claim).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Sign-in name (from the `preferred_username` claim).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferred_username: Option<String>,
    /// Provider object id of the user.
    #[serde(rename = "oid")]
    subject: String,
    /// Provider tenant id.
    #[serde(rename = "tid", default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
}

impl UserIdentity {
    /// Creates an identity with only the provider subject id.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            name: None,
            preferred_username: None,
            subject: subject.into(),
            tenant_id: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Sets the sign-in name.
    #[must_use]
    pub fn with_preferred_username(mut self, preferred_username: Option<String>) -> Self {
        self.preferred_username = preferred_username;
        self
    }

    /// Sets the tenant id.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Returns the display name, if available.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the sign-in name, if available.
    #[must_use]
    pub fn preferred_username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }

    /// Returns the provider subject id.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the tenant id, if available.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }
}
