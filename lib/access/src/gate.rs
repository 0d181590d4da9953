//! Role gates for route protection.
//!
//! A [`RoleGate`] is built once per protected route and evaluated against
//! the request's session. Evaluation order is fixed:
//!
//! 1. no user in the session: `Unauthenticated`
//! 2. stale session: `Unauthenticated` (expired)
//! 3. stamp activity
//! 4. role check: `Allow` or `Forbidden`
//!
//! Activity is stamped before the role check so that the idle clock reflects
//! any authenticated request, including ones that end up forbidden.

use std::collections::BTreeSet;

use crate::activity;
use crate::clock::{StaleReason, StalenessPolicy};
use crate::error::AuthorizationError;
use crate::session::SessionAccessor;

/// How the required roles combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Every required role must be held.
    All,
    /// At least one required role must be held.
    Any,
}

/// Why a request was treated as unauthenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// No user in the session.
    NotLoggedIn,
    /// The session went stale.
    Stale(StaleReason),
}

/// Outcome of evaluating a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allow,
    /// The caller must (re-)authenticate. Maps to HTTP 401.
    Unauthenticated(UnauthenticatedReason),
    /// The caller is authenticated but lacks the roles. Maps to HTTP 403.
    Forbidden(AuthorizationError),
}

impl Decision {
    /// Returns true for [`Decision::Allow`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Converts the decision into a result for `?` propagation in guards.
    ///
    /// # Errors
    ///
    /// Returns the matching `AuthorizationError` for every non-`Allow` decision.
    pub fn into_result(self) -> Result<(), AuthorizationError> {
        match self {
            Self::Allow => Ok(()),
            Self::Unauthenticated(UnauthenticatedReason::NotLoggedIn) => {
                Err(AuthorizationError::NotAuthenticated)
            }
            Self::Unauthenticated(UnauthenticatedReason::Stale(_)) => {
                Err(AuthorizationError::SessionExpired)
            }
            Self::Forbidden(err) => Err(err),
        }
    }
}

/// An immutable role predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    required: BTreeSet<String>,
    mode: GateMode,
}

impl RoleGate {
    /// Builds a gate from role names. Names are trimmed and lowercased;
    /// blank names are dropped.
    #[must_use]
    pub fn new<I, S>(mode: GateMode, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let required = roles
            .into_iter()
            .map(|r| r.as_ref().trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        Self { required, mode }
    }

    /// Gate requiring a single role.
    #[must_use]
    pub fn require_role(role: &str) -> Self {
        Self::new(GateMode::Any, [role])
    }

    /// Gate requiring every listed role (AND).
    #[must_use]
    pub fn require_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(GateMode::All, roles)
    }

    /// Gate requiring at least one listed role (OR).
    #[must_use]
    pub fn require_any_role<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(GateMode::Any, roles)
    }

    /// Returns the normalized required roles.
    #[must_use]
    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Returns the combination mode.
    #[must_use]
    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Evaluates the gate against a session at `now` epoch seconds.
    ///
    /// Stamps `last_activity_at` once the session is known to be signed in
    /// and fresh, whatever the role outcome.
    pub fn evaluate<S>(&self, session: &mut S, policy: &StalenessPolicy, now: i64) -> Decision
    where
        S: SessionAccessor + ?Sized,
    {
        if session.user().is_none() {
            return Decision::Unauthenticated(UnauthenticatedReason::NotLoggedIn);
        }
        if let Some(reason) = policy.staleness(&*session, now) {
            return Decision::Unauthenticated(UnauthenticatedReason::Stale(reason));
        }

        activity::touch(session, now);

        self.check_roles(session.roles())
    }

    fn check_roles(&self, held: &BTreeSet<String>) -> Decision {
        let held: BTreeSet<String> = held.iter().map(|r| r.to_lowercase()).collect();
        match self.mode {
            GateMode::All => {
                let missing: Vec<String> = self.required.difference(&held).cloned().collect();
                if missing.is_empty() {
                    Decision::Allow
                } else {
                    Decision::Forbidden(AuthorizationError::MissingRequiredRoles { missing })
                }
            }
            GateMode::Any => {
                if self.required.intersection(&held).next().is_some() {
                    Decision::Allow
                } else {
                    Decision::Forbidden(AuthorizationError::NoAcceptableRole {
                        accepted: self.required.iter().cloned().collect(),
                    })
                }
            }
        }
    }
}
