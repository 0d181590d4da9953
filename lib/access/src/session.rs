//! Session state read and written by authorization.
//!
//! The session transport (cookie, store, serialization) belongs to the web
//! layer. Authorization only goes through [`SessionAccessor`], and [`Session`]
//! is the serde-backed mapping the server keeps per principal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::user::UserIdentity;

/// Unique identifier for a session.
///
/// Session IDs are opaque strings generated during session creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new session ID from a string.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Read/write access to the session fields authorization depends on.
pub trait SessionAccessor {
    /// The signed-in user, if any.
    fn user(&self) -> Option<&UserIdentity>;

    /// Role names resolved at login, as stored.
    fn roles(&self) -> &BTreeSet<String>;

    /// Epoch seconds of the last role resolution.
    fn groups_fetched_at(&self) -> Option<i64>;

    /// Epoch seconds of the last authenticated request.
    fn last_activity_at(&self) -> Option<i64>;

    /// Records activity at `at` epoch seconds.
    fn set_last_activity_at(&mut self, at: i64);
}

/// Per-principal session mapping.
///
/// Serializes with the keys `user`, `roles`, `groups_fetched_at`,
/// `last_activity_at` and, when troubleshooting is enabled, `group_ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserIdentity>,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    groups_fetched_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_activity_at: Option<i64>,
    /// Raw member group ids from the last resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_ids: Option<BTreeSet<String>>,
}

impl Session {
    /// Creates an empty, unauthenticated session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the result of a successful login.
    ///
    /// Replaces identity and roles, and restarts the refresh clock at
    /// `fetched_at`. Previously recorded group ids are discarded.
    pub fn establish(&mut self, user: UserIdentity, roles: BTreeSet<String>, fetched_at: i64) {
        self.user = Some(user);
        self.roles = roles;
        self.groups_fetched_at = Some(fetched_at);
        self.group_ids = None;
    }

    /// Records the raw member group ids for troubleshooting.
    pub fn set_group_ids(&mut self, group_ids: BTreeSet<String>) {
        self.group_ids = Some(group_ids);
    }

    /// Returns the recorded member group ids, if any.
    #[must_use]
    pub fn group_ids(&self) -> Option<&BTreeSet<String>> {
        self.group_ids.as_ref()
    }

    /// Returns true if a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Removes every field, leaving an unauthenticated session.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl SessionAccessor for Session {
    fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    fn groups_fetched_at(&self) -> Option<i64> {
        self.groups_fetched_at
    }

    fn last_activity_at(&self) -> Option<i64> {
        self.last_activity_at
    }

    fn set_last_activity_at(&mut self, at: i64) {
        self.last_activity_at = Some(at);
    }
}
