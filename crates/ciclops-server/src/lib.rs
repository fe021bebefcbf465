//! Ciclops Web Server
//!
//! Axum-based REST API over the document pipeline.
//!
//! - Restrictive CORS policy
//! - Request body size limits
//! - Core errors mapped to HTTP statuses, internal details kept in the logs

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use ciclops_core::{AIBackend, AIClient, Error as CoreError, Pipeline};

mod handlers;

/// Maximum extraction upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub pipeline: Pipeline,
    /// Backend reported by the health endpoint
    pub ai: Option<AIClient>,
    pub config: ServerConfig,
}

/// Create the router with all API routes
pub fn create_router(pipeline: Pipeline, ai: Option<AIClient>, config: ServerConfig) -> Router {
    router(Arc::new(AppState {
        pipeline,
        ai,
        config,
    }))
}

/// Create the router over existing state
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Documents
        .route(
            "/documents",
            get(handlers::list_documents).post(handlers::create_document),
        )
        .route("/documents/:id", get(handlers::get_document))
        .route("/documents/:id/process", post(handlers::process_document))
        .route(
            "/documents/:id/reprocess",
            post(handlers::reprocess_document),
        )
        .route(
            "/documents/:id/summaries",
            get(handlers::get_document_summaries),
        )
        // Corrections
        .route(
            "/corrections",
            get(handlers::list_corrections).post(handlers::create_correction),
        )
        .route("/corrections/stores", post(handlers::create_store_correction))
        .route("/corrections/log", get(handlers::get_correction_log))
        // Summaries
        .route("/summaries", get(handlers::list_summaries))
        .route("/summaries/:store/:period", get(handlers::get_summary))
        // Fiscal calendar
        .route("/fiscal/period", get(handlers::fiscal_period))
        .route("/fiscal/periods", get(handlers::fiscal_periods))
        // Stores
        .route("/stores", get(handlers::list_stores));

    let cors = cors_layer(&state.config);

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        return layer;
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    layer.allow_origin(origins)
}

/// Start the server
pub async fn serve(
    pipeline: Pipeline,
    ai: Option<AIClient>,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    check_ai_connection(ai.as_ref()).await;

    let app = create_router(pipeline, ai, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection(ai: Option<&AIClient>) {
    match ai {
        Some(client) => {
            let info = client.info();
            if client.health_check().await {
                info!(
                    backend = %info.backend,
                    host = %info.host,
                    model = %info.model,
                    "AI classification fallback connected"
                );
            } else {
                warn!(
                    backend = %info.backend,
                    host = %info.host,
                    "AI backend configured but not responding; classification uses heuristics only"
                );
            }
        }
        None => {
            info!("AI backend not configured (set OLLAMA_HOST or AI_BACKEND to enable the fallback)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    retryable: bool,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            retryable: false,
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn conflict(msg: &str) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn unprocessable(msg: &str) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing error for a core error, if it has one
    fn from_core(err: &CoreError) -> Option<Self> {
        let root = err.root();
        let message = root.to_string();
        let app = match root {
            CoreError::NotFound(_) => Self::not_found(&message),
            CoreError::ConcurrentProcessing { .. } => Self {
                retryable: true,
                ..Self::conflict(&message)
            },
            CoreError::EmptyDocument { .. } => Self::unprocessable(&message),
            CoreError::InvalidData(_) | CoreError::InvalidDate { .. } => {
                Self::bad_request(&message)
            }
            _ => return None,
        };
        Some(app)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = if self.retryable {
            Json(serde_json::json!({
                "error": self.message,
                "retryable": true
            }))
        } else {
            Json(serde_json::json!({
                "error": self.message
            }))
        };

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        if let Some(app) = err.downcast_ref::<CoreError>().and_then(AppError::from_core) {
            return app;
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            retryable: false,
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
