//! Application router and the demo routes.

use std::sync::Arc;

use axum::{Json, Router, middleware, routing::get};
use groupgate_access::{SessionAccessor, UserIdentity};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState, CurrentSession, RouteGuard, middleware::enforce};

/// Response of `/`.
#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub logged_in: bool,
    pub user: Option<UserIdentity>,
}

/// Response of the gated demo routes.
#[derive(Debug, Serialize)]
pub struct AreaResponse {
    pub ok: bool,
    pub area: &'static str,
}

async fn home(CurrentSession(session): CurrentSession) -> Json<HomeResponse> {
    let user = session.and_then(|s| s.user().cloned());
    Json(HomeResponse {
        logged_in: user.is_some(),
        user,
    })
}

async fn admin_area() -> Json<AreaResponse> {
    Json(AreaResponse {
        ok: true,
        area: "admin",
    })
}

async fn support_area() -> Json<AreaResponse> {
    Json(AreaResponse {
        ok: true,
        area: "support",
    })
}

async fn support_or_admin_area() -> Json<AreaResponse> {
    Json(AreaResponse {
        ok: true,
        area: "support or admin",
    })
}

/// Builds the application router.
///
/// Every request passes through the activity hook; gated routes evaluate
/// their [`RouteGuard`] before the handler.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = RouteGuard::require_roles(state.clone(), ["admin"]);
    let support = RouteGuard::require_roles(state.clone(), ["support"]);
    let support_or_admin = RouteGuard::require_any_role(state.clone(), ["support", "admin"]);

    Router::new()
        .route("/", get(home))
        .route("/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/me", get(auth::me))
        .route("/logout", get(auth::logout))
        .route(
            "/admin",
            get(admin_area).route_layer(middleware::from_fn_with_state(admin, enforce)),
        )
        .route(
            "/support",
            get(support_area).route_layer(middleware::from_fn_with_state(support, enforce)),
        )
        .route(
            "/support-or-admin",
            get(support_or_admin_area)
                .route_layer(middleware::from_fn_with_state(support_or_admin, enforce)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::track_activity,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
