//! Guard staging server - annotation workflow for keyword and rule proposals

use clap::Parser;
use guard_staging::config::Config;
use guard_staging::store::{self, Store};
use guard_staging::{api, AppState};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guard_staging=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    // Database connection
    let pool = store::connect(&config.database_url, config.max_connections).await?;

    // Run migrations
    Store::new(pool.clone()).run_migrations().await?;

    let settings = config.staging_settings();
    tracing::info!(
        lease_minutes = settings.lease.num_minutes(),
        max_batch_size = settings.max_batch_size,
        strict_ownership = settings.strict_ownership,
        "staging settings"
    );
    let state = AppState::new(pool, settings);

    // Build router
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
