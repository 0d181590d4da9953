//! Authentication routes for login, callback, profile and logout.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use groupgate_access::{
    AuthenticationError, CallbackData, LoginState, Session, SessionAccessor, UserIdentity,
    complete_login, unix_now,
};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use time::Duration as TimeDuration;

use super::{AppState, CurrentSession, SESSION_COOKIE, middleware::session_id};

/// Auth state cookie name (for CSRF protection during the OIDC flow).
pub const AUTH_STATE_COOKIE: &str = "auth_state";

/// Query parameters for the OIDC callback.
///
/// The provider sends `error` instead of `code` when the user cancels or
/// consent fails, so every field is optional here.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackQuery {
    fn into_callback(self) -> Result<CallbackData, AuthError> {
        if let Some(error) = self.error {
            return Err(AuthError::ProviderDenied {
                error,
                description: self.error_description,
            });
        }
        match (self.code, self.state) {
            (Some(code), Some(state)) => Ok(CallbackData { code, state }),
            _ => Err(AuthError::MissingParameters),
        }
    }
}

fn encode_login_state(state: &LoginState) -> Result<String, AuthError> {
    let json = serde_json::to_vec(state).map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_login_state(value: &str) -> Option<LoginState> {
    let json = URL_SAFE_NO_PAD.decode(value).ok()?;
    serde_json::from_slice(&json).ok()
}

/// Initiates the login flow by redirecting to the identity provider.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let initiation = state.provider.login_redirect().map_err(AuthError::Provider)?;

    // Store the login state in a short-lived cookie for validation on callback
    let cookie = Cookie::build((AUTH_STATE_COOKIE, encode_login_state(&initiation.state)?))
        .path("/")
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(10));

    tracing::debug!(provider = state.provider.name(), "redirecting to identity provider");

    Ok((jar.add(cookie), Redirect::to(&initiation.authorization_url)))
}

/// Handles the callback after the user authenticates with the identity provider.
///
/// On success a new session replaces any previous one. On failure nothing
/// in the session store changes.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let callback = query.into_callback()?;

    let auth_state_cookie = jar
        .get(AUTH_STATE_COOKIE)
        .ok_or(AuthError::MissingAuthState)?;
    let login_state =
        decode_login_state(auth_state_cookie.value()).ok_or(AuthError::InvalidAuthState)?;

    callback
        .verify_state(&login_state)
        .map_err(|_| AuthError::StateMismatch)?;

    let identity = state
        .provider
        .handle_callback(&callback, &login_state)
        .await
        .map_err(AuthError::Provider)?;

    let mut session = Session::new();
    complete_login(
        &mut session,
        identity,
        &state.policy,
        unix_now(),
        state.debug_group_ids,
    );

    tracing::info!(
        subject = session.user().map(UserIdentity::subject),
        role_count = session.roles().len(),
        roles = ?session.roles(),
        "user signed in"
    );

    let lifetime = state.session_config.lifetime().ok_or_else(|| {
        AuthError::Internal(format!(
            "session duration of {} minutes is out of range",
            state.session_config.duration_minutes
        ))
    })?;

    if let Some(previous) = session_id(&jar) {
        state.sessions.delete(&previous).await;
    }

    let new_id = state.sessions.create(session, lifetime).await;

    let session_cookie = Cookie::build((SESSION_COOKIE, new_id.as_str().to_string()))
        .path("/")
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::seconds(lifetime.num_seconds()));

    let remove_auth_state = Cookie::build((AUTH_STATE_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    let jar = jar.add(session_cookie).add(remove_auth_state);

    Ok((jar, Redirect::to("/me")))
}

/// Profile of the signed-in user.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserIdentity,
    pub roles: BTreeSet<String>,
    pub role_count: usize,
    pub groups_fetched_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<BTreeSet<String>>,
}

/// Returns the current user and roles, or redirects to `/login`.
pub async fn me(CurrentSession(session): CurrentSession) -> Response {
    let Some(session) = session else {
        return Redirect::to("/login").into_response();
    };
    let Some(user) = session.user().cloned() else {
        return Redirect::to("/login").into_response();
    };

    Json(MeResponse {
        user,
        roles: session.roles().clone(),
        role_count: session.roles().len(),
        groups_fetched_at: session.groups_fetched_at(),
        group_ids: session.group_ids().cloned(),
    })
    .into_response()
}

/// Logs out the user by deleting their session.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(id) = session_id(&jar) {
        state.sessions.delete(&id).await;
        tracing::debug!(session_id = %id, "session deleted");
    }

    let remove_session = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    (jar.add(remove_session), Redirect::to("/"))
}

/// Login flow errors.
///
/// Every client-side failure renders the same 400 response; the cause is
/// logged only.
#[derive(Debug)]
pub enum AuthError {
    MissingParameters,
    ProviderDenied {
        error: String,
        description: Option<String>,
    },
    MissingAuthState,
    InvalidAuthState,
    StateMismatch,
    Provider(Report<AuthenticationError>),
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Internal(msg) => {
                tracing::error!("login flow internal error: {}", msg);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
            }
            Self::Provider(report) => {
                tracing::error!(error = %report, "identity provider failure");
            }
            Self::ProviderDenied { error, description } => {
                tracing::warn!(%error, ?description, "identity provider returned an error");
            }
            Self::MissingParameters => {
                tracing::warn!("callback without code or state");
            }
            Self::MissingAuthState => {
                tracing::warn!("callback without auth state cookie");
            }
            Self::InvalidAuthState => {
                tracing::warn!("callback with unreadable auth state cookie");
            }
            Self::StateMismatch => {
                tracing::warn!("callback state does not match auth state cookie");
            }
        }

        (StatusCode::BAD_REQUEST, "Authentication failed").into_response()
    }
}
