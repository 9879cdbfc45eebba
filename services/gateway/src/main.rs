use anyhow::{Context, Result};
use keepsake_gateway::api::{create_router, AppState};
use keepsake_gateway::auth::IdentityVerifier;
use keepsake_gateway::config::{Config, EntryBackend};
use keepsake_gateway::entry_store::{EntryStore, ObjectEntryStore, SharedFileStore};
use keepsake_gateway::jwks::JwksCache;
use keepsake_gateway::media_pipeline::MediaPipeline;
use keepsake_gateway::object_store::{ObjectStore, S3ObjectStore};
use keepsake_gateway::service::GatewayService;
use keepsake_gateway::transcoder::FfmpegTranscoder;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Keepsake media gateway"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let object_store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize object store")?,
    );

    let entry_store: Arc<dyn EntryStore> = match config.entries.backend {
        EntryBackend::SharedFile => {
            Arc::new(SharedFileStore::load(&config.entries.file_path).await)
        }
        EntryBackend::Object => Arc::new(ObjectEntryStore::new(
            object_store.clone(),
            config.entries.object_key_prefix.clone(),
        )),
    };

    let verifier = IdentityVerifier::new(
        Arc::new(JwksCache::new(&config.auth.issuer_base_url)),
        &config.auth,
    );

    let pipeline = MediaPipeline::new(
        object_store.clone(),
        Arc::new(FfmpegTranscoder::new(config.media.ffmpeg_path.clone())),
        config.media.clone(),
    );

    let service = GatewayService::new(verifier, pipeline, entry_store, object_store);

    let state = AppState {
        service: Arc::new(service),
    };

    // Start the API server
    let router = create_router(state, &config.api, config.media.max_upload_bytes);
    let addr = format!("{}:{}", config.api.host, config.api.port);

    info!(address = %addr, "Starting gateway API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("Gateway stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
