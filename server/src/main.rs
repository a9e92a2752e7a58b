//! Wedding RSVP server binary.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wedding_rsvp_core::Stores;
use wedding_rsvp_core::environment::SystemClock;
use wedding_rsvp_postgres::PostgresStore;
use wedding_rsvp_runtime::Services;
use wedding_rsvp_runtime::metrics::MetricsServer;
use wedding_server::config::DEV_JWT_SECRET;
use wedding_server::{AppState, Application, Config, JwtVerifier, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wedding_server=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wedding RSVP server");

    let config = Config::from_env();
    config.validate()?;
    if config.auth.jwt_secret == DEV_JWT_SECRET {
        warn!("APP_ENV=development with AUTH_JWT_SECRET unset; using the development secret");
    }
    if config.auth.test_token.is_some() {
        warn!("AUTH_TEST_TOKEN is set; the static test token is accepted");
    }
    info!(
        profile = ?config.profile,
        server_addr = %config.server_addr(),
        metrics_addr = %config.metrics_addr(),
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout))
        .connect(&config.database.url)
        .await
        .context("failed to connect to the database")?;
    let store = PostgresStore::new(pool);
    store.migrate().await.context("failed to run migrations")?;
    info!("Database ready");

    let metrics_addr: SocketAddr = config
        .metrics_addr()
        .parse()
        .context("invalid metrics address")?;
    MetricsServer::new(metrics_addr).start()?;

    let clock = Arc::new(SystemClock);
    let services = Services::new(
        Stores::from_backend(Arc::new(store)),
        clock.clone(),
        config.runtime_settings(),
    );
    let verifier = JwtVerifier::new(&config.auth.jwt_secret, clock)
        .with_test_token(config.auth.test_token.clone());
    let state = AppState::new(services.clone(), Arc::new(verifier));
    let app = build_router(state, &config.server.allowed_origins);

    let listener = tokio::net::TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr()))?;

    Application::new(listener, app, services, config.shutdown_timeout())
        .run()
        .await?;
    Ok(())
}
