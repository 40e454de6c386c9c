//! API module
//!
//! HTTP API endpoints and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::aggregator::BankAggregator;

pub mod middleware;
pub mod routes;

pub use routes::create_router;

/// Shared state of the HTTP layer
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<BankAggregator>,

    /// Deadline attached to each request's operation context
    pub request_timeout: Duration,

    /// Cancelled on shutdown; every request context is a child of it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(aggregator: Arc<BankAggregator>, request_timeout: Duration) -> Self {
        Self {
            aggregator,
            request_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Build the application router
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // Layers run last-added first: context -> logging -> handler
    let api_routes = create_router()
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::context_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health_check))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origin)),
        )
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }

    match HeaderValue::from_str(origin.trim()) {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS origin, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}
