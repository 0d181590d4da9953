//! Authentication module for the groupgate server.
//!
//! This module provides:
//! - Login through an [`IdentityProvider`] (Microsoft Entra in production)
//! - In-memory session storage
//! - Role guards and extractors for Axum routes
//!
//! # Authorization Model
//!
//! Roles are resolved once at login from the principal's group membership
//! and stored in the session. Every guarded request checks the stored roles
//! without calling the provider; group changes take effect at the next
//! login, which the role refresh interval forces.

pub mod microsoft;
pub mod middleware;
pub mod routes;
pub mod store;

use std::sync::Arc;

use groupgate_access::{AccessPolicy, IdentityProvider, StalenessPolicy};

use crate::config::SessionConfig;

pub use microsoft::{GraphClient, MicrosoftProvider};
pub use middleware::{AuthRejection, CurrentSession, RouteGuard, track_activity};
pub use routes::{callback, login, logout, me};
pub use store::SessionStore;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Shared application state.
pub struct AppState {
    /// Provider used for login.
    pub provider: Arc<dyn IdentityProvider>,
    /// Server-side sessions.
    pub sessions: SessionStore,
    /// Group to role mapping.
    pub policy: AccessPolicy,
    /// Staleness thresholds.
    pub staleness: StalenessPolicy,
    /// Session configuration.
    pub session_config: SessionConfig,
    /// Whether raw member group ids are kept for `/me`.
    pub debug_group_ids: bool,
}

impl AppState {
    /// Creates a new application state with an empty session store.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        policy: AccessPolicy,
        staleness: StalenessPolicy,
        session_config: SessionConfig,
        debug_group_ids: bool,
    ) -> Self {
        Self {
            provider,
            sessions: SessionStore::new(),
            policy,
            staleness,
            session_config,
            debug_group_ids,
        }
    }
}
