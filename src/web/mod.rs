pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{
    models::{ModelRegistry, OnnxLoader},
    utils::error::ServiceError,
    Config, Result,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(config: Config, registry: ModelRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let loader = Arc::new(OnnxLoader::new(config.onnx_config.clone()));
    let registry = ModelRegistry::discover(&config.models_dir, loader)?;

    let registry = if config.lazy_loading {
        tracing::info!("Lazy loading enabled, models load on first request");
        registry
    } else {
        // 预加载在阻塞线程中进行
        tokio::task::spawn_blocking(move || {
            let loaded = registry.preload();
            tracing::info!("Preloaded {} model(s)", loaded);
            registry
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Model preload failed: {}", e)))?
    };

    for (name, reason) in registry.skipped() {
        tracing::warn!("Model unavailable: {} ({})", name, reason);
    }

    let app = create_app(AppState::new(config.clone(), registry));

    let bind_addr = config.bind_addr();
    let addr: SocketAddr = bind_addr.parse().map_err(|e| {
        ServiceError::Config(format!("Invalid bind address {}: {}", bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /predict/:model_name - Multipart upload (field 'image')");
    tracing::info!("  GET  /models              - Loaded and skipped models");
    tracing::info!("  GET  /health              - Health check");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ServiceError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServiceError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = &state.config.server_config;
    let max_request_size = server_config.max_request_size;
    let request_timeout = Duration::from_secs(server_config.request_timeout);

    Router::new()
        // 预测路由
        .route("/predict/alzheimer", post(handlers::predict_alzheimer))
        .route("/predict/brain_tumor", post(handlers::predict_brain_tumor))
        .route("/predict/parkinson", post(handlers::predict_parkinson))
        .route("/predict/:model_name", post(handlers::predict_handler))
        // 系统路由
        .route("/models", get(handlers::list_models_handler))
        .route("/health", get(handlers::health_handler))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
