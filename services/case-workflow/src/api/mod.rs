//! HTTP surface of the case workflow service.

pub mod handlers;
pub mod middleware;
pub mod response;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use tix_database::{PostgresPool, RedisPool};

use crate::CaseServices;
use handlers::*;
use middleware::{request_id_middleware, ORG_HEADER, USERNAME_HEADER};

/// Live connections checked by the detailed health check.
#[derive(Clone)]
pub struct HealthBackends {
    pub postgres: PostgresPool,
    pub redis: RedisPool,
}

#[derive(Clone)]
pub struct AppState {
    pub services: CaseServices,
    pub backends: Option<HealthBackends>,
}

pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .route("/health/detailed", get(detailed_health_check))
        .route("/case", post(create_case))
        .route("/case/:case_id/stage", patch(update_case_stage))
        .route("/dispatch/:case_id/SOP", get(get_case_sop))
        .route("/dashboard/summary", get(get_dashboard_summary))
        .route("/dashboard/summary/broadcast", post(broadcast_dashboard_summary))
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.services.config.server.max_request_size;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", create_api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST, Method::PATCH])
                        .allow_headers([
                            header::CONTENT_TYPE,
                            header::AUTHORIZATION,
                            HeaderName::from_static(ORG_HEADER),
                            HeaderName::from_static(USERNAME_HEADER),
                        ]),
                )
                .layer(DefaultBodyLimit::max(max_request_size))
                .layer(axum::middleware::from_fn(request_id_middleware)),
        )
        .with_state(state)
}
