//! Group-based authorization for groupgate.
//!
//! This crate provides:
//! - Role derivation from identity-provider groups with inheritance (`compute_roles`)
//! - Session staleness checks (`StalenessPolicy`, `is_stale`)
//! - Role gates deciding Allow / Unauthenticated / Forbidden (`RoleGate`)
//! - Activity stamping for idle timeout (`touch`)
//! - The identity provider abstraction used by the login flow
//!
//! # Access Control Model
//!
//! Each role is granted by membership in any of its configured groups.
//! Roles may imply other roles. Roles are resolved once at login and kept
//! in the session; a configurable refresh interval forces re-login so that
//! group changes are picked up, and an idle limit ends inactive sessions.
//!
//! # Example
//!
//! ```
//! use groupgate_access::{
//!     AccessPolicy, Decision, InheritanceConfig, RoleConfig, RoleGate, Session,
//!     StalenessPolicy, UserIdentity,
//! };
//! use std::collections::BTreeSet;
//!
//! let policy = AccessPolicy::new(
//!     RoleConfig::new()
//!         .with_role("admin", ["0f3c-admins"])
//!         .with_role("user", ["0f3c-users"]),
//!     InheritanceConfig::new().with_implied("admin", ["user"]),
//! )
//! .expect("valid role configuration");
//!
//! let member_groups: BTreeSet<String> = ["0F3C-ADMINS".to_string()].into();
//! let roles = policy.resolve(&member_groups);
//!
//! let mut session = Session::new();
//! session.establish(UserIdentity::new("oid-123"), roles, 1_700_000_000);
//!
//! let gate = RoleGate::require_roles(["user"]);
//! let decision = gate.evaluate(&mut session, &StalenessPolicy::new(3600, 900), 1_700_000_060);
//! assert_eq!(decision, Decision::Allow);
//! ```

pub mod activity;
pub mod clock;
pub mod error;
pub mod gate;
pub mod oidc;
pub mod provider;
pub mod role;
pub mod session;
pub mod user;

// Re-export main types at crate root
pub use activity::touch;
pub use clock::{StaleReason, StalenessPolicy, is_stale, unix_now};
pub use error::{AuthenticationError, AuthorizationError, ConfigurationError};
pub use gate::{Decision, GateMode, RoleGate, UnauthenticatedReason};
pub use oidc::OidcConfig;
pub use provider::{
    CallbackData, IdentityProvider, LoginInitiation, LoginState, ProviderIdentity, complete_login,
};
pub use role::{
    AccessPolicy, InheritanceConfig, MAX_GROUP_LOOKUP_BATCH, RoleConfig, all_configured_group_ids,
    compute_roles,
};
pub use session::{Session, SessionAccessor, SessionId};
pub use user::UserIdentity;
