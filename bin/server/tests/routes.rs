use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::routing::get as get_route;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use groupgate_access::{
    AccessPolicy, AuthenticationError, CallbackData, GateMode, IdentityProvider, InheritanceConfig,
    LoginInitiation, LoginState, ProviderIdentity, RoleConfig, SessionAccessor, SessionId,
    StalenessPolicy, UserIdentity, unix_now,
};
use groupgate_server::app::router;
use groupgate_server::auth::middleware::enforce;
use groupgate_server::auth::{AppState, RouteGuard};
use groupgate_server::config::SessionConfig;
use rootcause::prelude::Report;
use tower::ServiceExt;

const CSRF: &str = "csrf-1";

struct FakeProvider {
    groups: BTreeSet<String>,
    fail: AtomicBool,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn login_redirect(&self) -> Result<LoginInitiation, Report<AuthenticationError>> {
        Ok(LoginInitiation {
            authorization_url: format!("https://idp.example/authorize?state={CSRF}"),
            state: LoginState {
                csrf_token: CSRF.to_string(),
                pkce_verifier: "verifier".to_string(),
                nonce: "nonce".to_string(),
            },
        })
    }

    async fn handle_callback(
        &self,
        callback: &CallbackData,
        state: &LoginState,
    ) -> Result<ProviderIdentity, Report<AuthenticationError>> {
        assert_eq!(callback.code, "code-1");
        assert_eq!(state.pkce_verifier, "verifier");
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthenticationError::GroupLookupFailed { status: 503 }.into());
        }
        Ok(ProviderIdentity {
            user: UserIdentity::new("oid-1")
                .with_name(Some("Ada Lovelace".to_string()))
                .with_preferred_username(Some("ada@example.com".to_string()))
                .with_tenant_id(Some("tenant-1".to_string())),
            member_group_ids: self.groups.clone(),
        })
    }
}

fn policy() -> AccessPolicy {
    AccessPolicy::new(
        RoleConfig::new()
            .with_role("admin", ["G1"])
            .with_role("support", ["G2"])
            .with_role("user", ["G3"]),
        InheritanceConfig::new()
            .with_implied("admin", ["support", "user"])
            .with_implied("support", ["user"]),
    )
    .expect("policy")
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    provider: Arc<FakeProvider>,
}

fn app_with(groups: &[&str], staleness: StalenessPolicy, debug_group_ids: bool) -> TestApp {
    let provider = Arc::new(FakeProvider {
        groups: groups.iter().map(|g| g.to_string()).collect(),
        fail: AtomicBool::new(false),
    });
    let session_config = SessionConfig {
        secure_cookies: false,
        ..SessionConfig::default()
    };
    let state = Arc::new(AppState::new(
        provider.clone(),
        policy(),
        staleness,
        session_config,
        debug_group_ids,
    ));
    TestApp {
        router: router(state.clone()),
        state,
        provider,
    }
}

fn app(groups: &[&str]) -> TestApp {
    app_with(groups, StalenessPolicy::disabled(), false)
}

async fn get(app: &TestApp, uri: &str, cookie: Option<&str>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.router
        .clone()
        .oneshot(request.body(Body::empty()).expect("request"))
        .await
        .expect("response")
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("json")
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
}

/// Returns the `name=value` pair of a non-empty Set-Cookie for `name`.
fn set_cookie(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&prefix) && pair.len() > prefix.len())
        .map(str::to_string)
}

async fn auth_state_cookie(app: &TestApp) -> String {
    let response = get(app, "/login", None).await;
    set_cookie(&response, "auth_state").expect("auth_state cookie")
}

/// Runs the login flow and returns the session cookie pair.
async fn login(app: &TestApp) -> String {
    let auth_state = auth_state_cookie(app).await;
    let response = get(
        app,
        &format!("/auth/callback?code=code-1&state={CSRF}"),
        Some(&auth_state),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/me");
    set_cookie(&response, "session").expect("session cookie")
}

fn session_id(cookie: &str) -> SessionId {
    SessionId::from(cookie.trim_start_matches("session="))
}

#[tokio::test]
async fn login_redirects_to_provider_with_state_cookie() {
    let app = app(&[]);
    let response = get(&app, "/login", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://idp.example/authorize"));
    assert!(set_cookie(&response, "auth_state").is_some());
}

#[tokio::test]
async fn gated_routes_require_login() {
    let app = app(&["g1"]);
    for uri in ["/admin", "/support", "/support-or-admin"] {
        let response = get(&app, uri, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body_text(response).await, "Not authenticated");
    }
}

#[tokio::test]
async fn unknown_session_cookie_is_unauthenticated() {
    let app = app(&["g1"]);
    let response = get(&app, "/admin", Some("session=01UNKNOWN")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_reaches_every_area_through_inheritance() {
    let app = app(&["g1"]);
    let cookie = login(&app).await;

    for (uri, area) in [
        ("/admin", "admin"),
        ("/support", "support"),
        ("/support-or-admin", "support or admin"),
    ] {
        let response = get(&app, uri, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "ok": true, "area": area })
        );
    }
}

#[tokio::test]
async fn support_member_is_forbidden_from_admin() {
    let app = app(&["g2"]);
    let cookie = login(&app).await;

    assert_eq!(
        get(&app, "/support", Some(&cookie)).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        get(&app, "/support-or-admin", Some(&cookie)).await.status(),
        StatusCode::OK
    );

    let response = get(&app, "/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(response).await,
        "Forbidden (missing required roles)"
    );
}

#[tokio::test]
async fn plain_user_gets_distinct_forbidden_messages() {
    let app = app(&["g3"]);
    let cookie = login(&app).await;

    let response = get(&app, "/support", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(response).await,
        "Forbidden (missing required roles)"
    );

    let response = get(&app, "/support-or-admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Forbidden (no acceptable role)");
}

#[tokio::test]
async fn single_role_guard_on_a_custom_route() {
    let app = app(&["g3"]);
    let cookie = login(&app).await;

    let guard = RouteGuard::require_role(app.state.clone(), "Support");
    assert_eq!(guard.gate().mode(), GateMode::Any);
    assert!(guard.gate().required().contains("support"));

    let ops = Router::new().route(
        "/ops",
        get_route(|| async { "ops" })
            .route_layer(axum::middleware::from_fn_with_state(guard, enforce)),
    );
    let ops_app = TestApp {
        router: ops,
        state: app.state.clone(),
        provider: app.provider.clone(),
    };

    let response = get(&ops_app, "/ops", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get(&ops_app, "/ops", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Forbidden (no acceptable role)");

    let support = app_with(&["g2"], StalenessPolicy::disabled(), false);
    let cookie = login(&support).await;
    let guard = RouteGuard::require_role(support.state.clone(), "support");
    let ops_app = TestApp {
        router: Router::new().route(
            "/ops",
            get_route(|| async { "ops" })
                .route_layer(axum::middleware::from_fn_with_state(guard, enforce)),
        ),
        state: support.state.clone(),
        provider: support.provider.clone(),
    };
    let response = get(&ops_app, "/ops", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ops");
}

#[tokio::test]
async fn forbidden_request_still_records_activity() {
    let app = app(&["g3"]);
    let cookie = login(&app).await;
    let id = session_id(&cookie);
    app.state
        .sessions
        .update(&id, |s| s.set_last_activity_at(5))
        .await;

    let response = get(&app, "/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let session = app.state.sessions.find_by_id(&id).await.expect("session");
    assert!(session.last_activity_at().expect("stamped") > 5);
}

#[tokio::test]
async fn me_redirects_to_login_without_session() {
    let app = app(&[]);
    let response = get(&app, "/me", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn me_reports_user_and_resolved_roles() {
    let app = app(&["G1"]);
    let cookie = login(&app).await;
    let before = unix_now();

    let body = body_json(get(&app, "/me", Some(&cookie)).await).await;

    assert_eq!(body["user"]["oid"], "oid-1");
    assert_eq!(body["user"]["tid"], "tenant-1");
    assert_eq!(body["user"]["name"], "Ada Lovelace");
    assert_eq!(
        body["roles"],
        serde_json::json!(["admin", "support", "user"])
    );
    assert_eq!(body["role_count"], 3);
    assert!(body["groups_fetched_at"].as_i64().expect("timestamp") <= before);
    assert!(body.get("group_ids").is_none());
}

#[tokio::test]
async fn me_includes_group_ids_when_debugging() {
    let app = app_with(&["g2"], StalenessPolicy::disabled(), true);
    let cookie = login(&app).await;

    let body = body_json(get(&app, "/me", Some(&cookie)).await).await;
    assert_eq!(body["group_ids"], serde_json::json!(["g2"]));
}

#[tokio::test]
async fn member_of_no_configured_group_has_no_roles() {
    let app = app(&["unrelated"]);
    let cookie = login(&app).await;

    let body = body_json(get(&app, "/me", Some(&cookie)).await).await;
    assert_eq!(body["role_count"], 0);

    let response = get(&app, "/support-or-admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn provider_failure_is_400_and_keeps_existing_session() {
    let app = app(&["g2"]);
    let cookie = login(&app).await;
    let before = app
        .state
        .sessions
        .find_by_id(&session_id(&cookie))
        .await
        .expect("session");

    app.provider.fail.store(true, Ordering::SeqCst);
    let auth_state = auth_state_cookie(&app).await;
    let response = get(
        &app,
        &format!("/auth/callback?code=code-1&state={CSRF}"),
        Some(&format!("{cookie}; {auth_state}")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie(&response, "session").is_none());
    assert_eq!(body_text(response).await, "Authentication failed");

    let after = app
        .state
        .sessions
        .find_by_id(&session_id(&cookie))
        .await
        .expect("session kept");
    assert_eq!(after.roles(), before.roles());
    assert_eq!(after.groups_fetched_at(), before.groups_fetched_at());
}

#[tokio::test]
async fn callback_with_mismatched_state_is_rejected() {
    let app = app(&["g1"]);
    let auth_state = auth_state_cookie(&app).await;

    let response = get(
        &app,
        "/auth/callback?code=code-1&state=forged",
        Some(&auth_state),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie(&response, "session").is_none());
}

#[tokio::test]
async fn callback_without_auth_state_is_rejected() {
    let app = app(&["g1"]);
    let response = get(&app, &format!("/auth/callback?code=code-1&state={CSRF}"), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Authentication failed");
}

#[tokio::test]
async fn callback_with_provider_error_is_rejected() {
    let app = app(&["g1"]);
    let auth_state = auth_state_cookie(&app).await;
    let response = get(
        &app,
        &format!("/auth/callback?error=access_denied&state={CSRF}"),
        Some(&auth_state),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn relogin_issues_a_new_session() {
    let app = app(&["g1"]);
    let first = login(&app).await;

    let auth_state = auth_state_cookie(&app).await;
    let response = get(
        &app,
        &format!("/auth/callback?code=code-1&state={CSRF}"),
        Some(&format!("{first}; {auth_state}")),
    )
    .await;
    let second = set_cookie(&response, "session").expect("session cookie");

    assert_ne!(first, second);
    assert!(
        app.state
            .sessions
            .find_by_id(&session_id(&first))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn idle_session_is_expired_and_not_revived() {
    let app = app_with(&["g1"], StalenessPolicy::new(0, 60), false);
    let cookie = login(&app).await;
    let id = session_id(&cookie);
    let idle_since = unix_now() - 120;
    app.state
        .sessions
        .update(&id, |s| s.set_last_activity_at(idle_since))
        .await;

    let response = get(&app, "/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_text(response).await,
        "Session expired or inactive; please log in again"
    );

    // Neither the gate nor the activity hook may refresh a stale session
    get(&app, "/", Some(&cookie)).await;
    let session = app.state.sessions.find_by_id(&id).await.expect("session");
    assert_eq!(session.last_activity_at(), Some(idle_since));
}

#[tokio::test]
async fn recently_active_session_stays_fresh() {
    let app = app_with(&["g1"], StalenessPolicy::new(0, 60), false);
    let cookie = login(&app).await;
    let id = session_id(&cookie);
    app.state
        .sessions
        .update(&id, |s| s.set_last_activity_at(unix_now() - 30))
        .await;

    let response = get(&app, "/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn outdated_roles_require_login() {
    let app = app_with(&["g1"], StalenessPolicy::new(3600, 0), false);
    let cookie = login(&app).await;
    let id = session_id(&cookie);
    app.state
        .sessions
        .update(&id, |s| {
            let user = s.user().cloned().expect("user");
            let roles = s.roles().clone();
            s.establish(user, roles, unix_now() - 7200);
        })
        .await;

    let response = get(&app, "/support-or-admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_text(response).await,
        "Session expired or inactive; please log in again"
    );
}

#[tokio::test]
async fn activity_hook_stamps_ungated_requests() {
    let app = app(&["g3"]);
    let cookie = login(&app).await;
    let id = session_id(&cookie);
    app.state
        .sessions
        .update(&id, |s| s.set_last_activity_at(5))
        .await;

    let response = get(&app, "/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let session = app.state.sessions.find_by_id(&id).await.expect("session");
    assert!(session.last_activity_at().expect("stamped") > 5);
}

#[tokio::test]
async fn home_reports_login_state() {
    let app = app(&["g3"]);

    let body = body_json(get(&app, "/", None).await).await;
    assert_eq!(
        body,
        serde_json::json!({ "logged_in": false, "user": null })
    );

    let cookie = login(&app).await;
    let body = body_json(get(&app, "/", Some(&cookie)).await).await;
    assert_eq!(body["logged_in"], true);
    assert_eq!(body["user"]["preferred_username"], "ada@example.com");
}

#[tokio::test]
async fn logout_deletes_session() {
    let app = app(&["g1"]);
    let cookie = login(&app).await;

    let response = get(&app, "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = get(&app, "/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get(&app, "/me", Some(&cookie)).await;
    assert_eq!(location(&response), "/login");
}
