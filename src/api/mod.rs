pub mod error;
pub mod health;
pub mod response;
pub mod v1;

use axum::{http::Method, routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    // a manual run may take up to the search timeout
    let timeout = Duration::from_secs(state.cfg.planner.timeout_seconds + 5);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", v1::router())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(TimeoutLayer::new(timeout)),
        )
}
