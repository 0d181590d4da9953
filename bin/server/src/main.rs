use std::sync::Arc;

use groupgate_access::IdentityProvider;
use groupgate_server::{
    app,
    auth::{AppState, MicrosoftProvider},
    config::ServerConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    config.validate().expect("invalid session configuration");

    // Role configuration errors must stop startup, not surface at request time
    let policy = config
        .roles
        .access_policy()
        .expect("invalid role configuration");
    let staleness = config.staleness();

    tracing::info!(
        roles = policy.role_groups().len(),
        group_ids = policy.lookup_group_ids().len(),
        role_refresh_interval_seconds = staleness.role_refresh_interval_seconds,
        session_max_idle_seconds = staleness.max_idle_seconds,
        debug_group_ids = config.debug_group_ids,
        "Loaded configuration"
    );
    tracing::debug!(role_inherits = ?policy.role_inherits(), "Role inheritance");

    tracing::info!("Discovering OIDC provider...");
    let provider = MicrosoftProvider::discover(config.oidc, policy.lookup_group_ids())
        .await
        .expect("failed to discover OIDC provider");
    let provider: Arc<dyn IdentityProvider> = Arc::new(provider);

    let app_state = Arc::new(AppState::new(
        provider,
        policy,
        staleness,
        config.session.clone(),
        config.debug_group_ids,
    ));

    // Spawn periodic session cleanup task
    let sessions = app_state.sessions.clone();
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            let count = sessions.delete_expired().await;
            if count > 0 {
                tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(listener, app::router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
