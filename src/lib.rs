use std::time::Duration;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub mod config;
pub mod context;
pub mod format;
pub mod middleware;
pub mod routes;
pub mod sink;

pub use context::{add_debug_value, ErrorType, RequestError, RequestScope, DEBUG_VALUES_KEY};
pub use middleware::logging::{access_log_middleware, AccessLogger};
pub use sink::{LogSink, MemorySink, StdoutSink};

#[derive(Clone)]
pub struct AppState {
    pub debug_logging: bool,
}

/// Builds the demo router with the access logger mounted on every route.
pub fn create_app(logger: AccessLogger, timeout: Duration) -> Router {
    let state = AppState {
        debug_logging: logger.debug_enabled(),
    };

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/v1/echo", post(routes::echo::echo))
        .route("/api/v1/users", post(routes::users::create_user))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout))
                .layer(from_fn_with_state(logger, access_log_middleware)),
        )
        .with_state(state)
}
