//! Identity provider abstraction and the login flow around it.
//!
//! The web layer drives a provider through two steps: [`IdentityProvider::login_redirect`]
//! produces the authorize URL plus state to keep in a cookie, and
//! [`IdentityProvider::handle_callback`] turns the returned code into an
//! identity and the member group ids. [`complete_login`] then resolves roles
//! and writes them into the session.

use std::collections::BTreeSet;

use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};

use crate::error::AuthenticationError;
use crate::role::AccessPolicy;
use crate::session::Session;
use crate::user::UserIdentity;

/// State issued at login that must come back with the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    /// CSRF token sent as the OAuth `state` parameter.
    pub csrf_token: String,
    /// PKCE code verifier for the token exchange.
    pub pkce_verifier: String,
    /// Nonce for ID token validation.
    pub nonce: String,
}

/// Login initiation data for redirecting to the provider.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    /// The URL to redirect the user to for authentication.
    pub authorization_url: String,
    /// State to store until the callback.
    pub state: LoginState,
}

/// Data needed to process a provider callback.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackData {
    /// The authorization code from the provider.
    pub code: String,
    /// The state parameter (must match the one from login initiation).
    pub state: String,
}

impl CallbackData {
    /// Checks the returned state against the state issued at login.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError::StateMismatch` if they differ.
    pub fn verify_state(&self, issued: &LoginState) -> Result<(), AuthenticationError> {
        if self.state == issued.csrf_token {
            Ok(())
        } else {
            Err(AuthenticationError::StateMismatch)
        }
    }
}

/// What a provider knows about the principal after a successful callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    /// Identity claims to keep in the session.
    pub user: UserIdentity,
    /// Configured group ids the principal is a member of, lowercased.
    pub member_group_ids: BTreeSet<String>,
}

/// An OAuth/OIDC identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Builds the authorize URL and the state to keep until the callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot produce an authorize URL.
    fn login_redirect(&self) -> Result<LoginInitiation, Report<AuthenticationError>>;

    /// Exchanges the callback code and looks up group membership.
    async fn handle_callback(
        &self,
        callback: &CallbackData,
        state: &LoginState,
    ) -> Result<ProviderIdentity, Report<AuthenticationError>>;
}

/// Resolves roles for a freshly authenticated principal and stores them.
///
/// When `keep_group_ids` is set the raw member group ids are stored as well.
pub fn complete_login(
    session: &mut Session,
    identity: ProviderIdentity,
    policy: &AccessPolicy,
    now: i64,
    keep_group_ids: bool,
) {
    let roles = policy.resolve(&identity.member_group_ids);
    session.establish(identity.user, roles, now);
    if keep_group_ids {
        session.set_group_ids(identity.member_group_ids);
    }
}
