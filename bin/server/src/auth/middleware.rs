//! Role guards, session extractors and the activity hook for Axum.

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use groupgate_access::{
    AuthorizationError, Decision, RoleGate, Session, SessionAccessor, SessionId,
    UnauthenticatedReason, touch, unix_now,
};
use std::sync::Arc;

use super::{AppState, SESSION_COOKIE};

/// Reads the session id from the session cookie.
pub(crate) fn session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| SessionId::new(cookie.value().to_string()))
}

/// A role gate bound to the application state.
///
/// Built once per protected route and installed with
/// `axum::middleware::from_fn_with_state(guard, enforce)`.
#[derive(Clone)]
pub struct RouteGuard {
    state: Arc<AppState>,
    gate: Arc<RoleGate>,
}

impl RouteGuard {
    /// Binds `gate` to the application state.
    pub fn new(state: Arc<AppState>, gate: RoleGate) -> Self {
        Self {
            state,
            gate: Arc::new(gate),
        }
    }

    /// Allows sessions holding `role`.
    pub fn require_role(state: Arc<AppState>, role: &str) -> Self {
        Self::new(state, RoleGate::require_role(role))
    }

    /// Allows sessions holding every one of `roles`.
    pub fn require_roles<I, S>(state: Arc<AppState>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(state, RoleGate::require_roles(roles))
    }

    /// Allows sessions holding at least one of `roles`.
    pub fn require_any_role<I, S>(state: Arc<AppState>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(state, RoleGate::require_any_role(roles))
    }

    /// Returns the gate this guard evaluates.
    pub fn gate(&self) -> &RoleGate {
        &self.gate
    }
}

/// Middleware evaluating a [`RouteGuard`] before the inner handler runs.
///
/// The gate runs against the stored session in place, so the activity stamp
/// it records is persisted even when the request is forbidden.
pub async fn enforce(
    State(guard): State<RouteGuard>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let id = session_id(&jar).ok_or(AuthRejection::NotAuthenticated)?;
    let now = unix_now();
    let staleness = guard.state.staleness;

    let decision = guard
        .state
        .sessions
        .update(&id, |session| guard.gate.evaluate(session, &staleness, now))
        .await
        .unwrap_or(Decision::Unauthenticated(UnauthenticatedReason::NotLoggedIn));

    match decision {
        Decision::Allow => Ok(next.run(request).await),
        Decision::Unauthenticated(UnauthenticatedReason::NotLoggedIn) => {
            tracing::debug!(session_id = %id, "request without signed-in user");
            Err(AuthRejection::NotAuthenticated)
        }
        Decision::Unauthenticated(UnauthenticatedReason::Stale(reason)) => {
            tracing::info!(session_id = %id, ?reason, "session is stale");
            Err(AuthRejection::SessionExpired)
        }
        Decision::Forbidden(error) => {
            tracing::warn!(
                session_id = %id,
                mode = ?guard.gate.mode(),
                required = ?guard.gate.required(),
                %error,
                "role check failed"
            );
            Err(AuthRejection::Forbidden(error))
        }
    }
}

/// Stamps `last_activity_at` after every request made with a live session.
///
/// Sessions without a user or already stale are left alone so an expired
/// session cannot be revived by further requests.
pub async fn track_activity(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if let Some(id) = session_id(&jar) {
        let now = unix_now();
        state
            .sessions
            .update(&id, |session| {
                if session.user().is_some() && !state.staleness.is_stale(&*session, now) {
                    touch(session, now);
                }
            })
            .await;
    }

    response
}

/// Extractor for the current session, if one exists in the store.
///
/// Never rejects; handlers decide what an absent or anonymous session means.
pub struct CurrentSession(pub Option<Session>);

impl<S> FromRequestParts<S> for CurrentSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_request_parts(parts, state).await?;

        let session = match session_id(&jar) {
            Some(id) => app_state.sessions.find_by_id(&id).await,
            None => None,
        };

        Ok(CurrentSession(session))
    }
}

/// Rejection type for route guards.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    SessionExpired,
    Forbidden(AuthorizationError),
}

impl AuthRejection {
    fn into_error(self) -> AuthorizationError {
        match self {
            Self::NotAuthenticated => AuthorizationError::NotAuthenticated,
            Self::SessionExpired => AuthorizationError::SessionExpired,
            Self::Forbidden(error) => error,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let error = self.into_error();
        let status = if error.is_unauthenticated() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::FORBIDDEN
        };

        (status, error.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_rejections_are_401() {
        let response = AuthRejection::NotAuthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthRejection::SessionExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn forbidden_rejection_is_403() {
        let response = AuthRejection::Forbidden(AuthorizationError::NoAcceptableRole {
            accepted: vec!["admin".to_string()],
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn session_id_reads_cookie() {
        use axum_extra::extract::cookie::Cookie;

        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "01ABC"));
        assert_eq!(session_id(&jar), Some(SessionId::from("01ABC")));
        assert_eq!(session_id(&CookieJar::new()), None);
    }
}
