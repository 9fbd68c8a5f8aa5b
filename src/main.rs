use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use footfall::api::{self, handlers::AppState};
use footfall::auth::OriginVerifier;
use footfall::config::Config;
use footfall::fingerprint::FingerprintGenerator;
use footfall::storage::{self, CachedCounterStore, CounterStore};
use footfall::visits::VisitRecorder;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("footfall=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let stores = storage::open(&config.database).await?;
    info!("Storage initialized successfully");

    let counters: Arc<dyn CounterStore> = if config.cache.stats_ttl_secs > 0 {
        info!(
            "📦 Caching visit totals for {}s",
            config.cache.stats_ttl_secs
        );
        Arc::new(CachedCounterStore::new(
            stores.counters,
            Duration::from_secs(config.cache.stats_ttl_secs),
        ))
    } else {
        stores.counters
    };

    let fingerprints = FingerprintGenerator::new(
        config
            .visits
            .fingerprint_salt
            .as_ref()
            .map(|salt| salt.expose()),
    )
    .map_err(|_| anyhow::anyhow!("invalid FINGERPRINT_SALT"))?;
    if config.visits.fingerprint_salt.is_some() {
        info!("🔑 Fingerprints are keyed with the configured salt");
    }

    let recorder = Arc::new(VisitRecorder::new(
        stores.dedup,
        counters,
        fingerprints,
        config.visits.dedup_window,
    ));
    info!(
        "⏱️ Deduplication window: {}s",
        config.visits.dedup_window.as_secs()
    );

    let verifier = Arc::new(OriginVerifier::from_config(&config.origin));
    info!(
        "🔐 Origin verification enabled (header: {})",
        verifier.header_name()
    );

    let router = api::create_api_router(
        AppState {
            recorder,
            headers: config.headers.clone(),
        },
        verifier,
        &config.cors,
    );

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Visitor counter listening on http://{}", addr);
    info!("   - Visit endpoint at http://{}{}", addr, api::routes::VISIT_PATH);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
