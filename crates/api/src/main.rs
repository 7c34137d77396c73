use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use swatch_core::import_job::{JobFailure, FAILURE_INTERNAL};
use swatch_core::pipeline::ImportPipeline;
use swatch_core::ports::ObjectStorage;
use swatch_db::repositories::{ImportJobRepo, PgProfileSource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swatch_api::catalog::HttpCatalogClient;
use swatch_api::config::ServerConfig;
use swatch_api::engine::ImportEngine;
use swatch_api::router::build_app_router;
use swatch_api::state::AppState;
use swatch_api::storage::LocalObjectStorage;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "swatch_api=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = swatch_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    swatch_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    swatch_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // Jobs run in-process; anything still active was left by a previous run.
    let orphaned = ImportJobRepo::fail_orphaned(
        &pool,
        &JobFailure::new(FAILURE_INTERNAL, "Server restarted while the job was running"),
    )
    .await
    .expect("Failed to fail orphaned import jobs");
    if orphaned > 0 {
        tracing::warn!(orphaned, "Failed import jobs left running by a previous process");
    }

    // --- Import engine ---
    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStorage::new(
        config.import.storage_dir.clone(),
        config.import.public_base_url.clone(),
    ));
    let catalog = Arc::new(HttpCatalogClient::new(&config.catalog));
    let profiles = Arc::new(PgProfileSource::new(pool.clone()));
    let pipeline = ImportPipeline::new(
        catalog,
        Arc::clone(&storage),
        profiles,
        config.import.pipeline_config(),
    );
    let engine = Arc::new(ImportEngine::new(pool.clone(), pipeline, Arc::clone(&storage)));
    tracing::info!(
        storage_dir = %config.import.storage_dir.display(),
        catalog_url = %config.catalog.api_url,
        "Import engine ready",
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine: Arc::clone(&engine),
        storage,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!(
        running = engine.running_count(),
        "Server stopped accepting connections, canceling running imports",
    );
    engine
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
