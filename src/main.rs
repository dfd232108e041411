use patient_portal_api::{
    api,
    config::Config,
    db::Database,
    handlers::AppState,
    profile_store::{PgProfileStore, ProfileStore},
    upstream,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, connects the database pools,
/// builds the shared HTTP client and upstream clients, then starts the Axum
/// server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG wins, then LOG_LEVEL, then the crate default
    let default_filter = std::env::var("LOG_LEVEL")
        .map(|level| format!("patient_portal_api={},tower_http={}", level, level))
        .unwrap_or_else(|_| "patient_portal_api=debug,tower_http=debug".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url, config.database_service_url.as_deref()).await?;
    tracing::info!(
        "Database connection pool established (elevated: {})",
        db.service_pool.is_some()
    );

    let store: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(db.pool, db.service_pool));

    let http = upstream::build_http_client()?;
    tracing::info!("Outbound HTTP client initialized");

    let port = config.port;
    let app_state = Arc::new(AppState::new(config, http, store));
    let app = api::router(app_state, true)?;

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Patient Portal API listening on {}", addr);
    tracing::info!("📚 API Documentation: http://localhost:{}/api/docs", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
