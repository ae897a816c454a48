//! Aforo API server
//!
//! HTTP REST API over the calculation engine using Axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::core::CalculationEngine;

/// API Server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub engine: Arc<CalculationEngine>,
}

impl AppState {
    pub fn new(engine: CalculationEngine) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine: Arc::new(engine),
        }
    }
}

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "aforo_engine=info,aforo_server=info,tower_http=info";

/// Install the global tracing subscriber (stderr); later calls are no-ops
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Calculations
        .route("/api/v1/calculate/:profile", post(handlers::calculate))
        .route(
            "/api/v1/update-project-excel",
            post(handlers::update_project_excel),
        )
        .route("/api/v1/get-project-excel", get(handlers::get_project_excel))
        .route("/api/v1/readMatriz", post(handlers::read_matriz))
        // Cost reports
        .route(
            "/api/v1/costos/infraestructura",
            get(handlers::costos_infraestructura),
        )
        .route(
            "/api/v1/costos/equipamiento",
            get(handlers::costos_equipamiento),
        )
        .route("/api/v1/costos/completo", get(handlers::costos_completo))
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: ApiConfig, engine: CalculationEngine) -> anyhow::Result<()> {
    init_tracing(DEFAULT_LOG_FILTER);

    let project = engine.config().project_workbook.display().to_string();
    let matriz = engine.config().matriz_workbook.display().to_string();
    let app = router(Arc::new(AppState::new(engine)));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Aforo API Server starting on http://{}", addr);
    info!("   Project workbook: {}", project);
    info!("   Matriz workbook: {}", matriz);
    info!("   Health: /health, Version: /version");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Aforo API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
