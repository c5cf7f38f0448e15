use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
///
/// When the configured root path is not `/`, every route is served beneath it.
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/docs", get(handlers::docs::swagger_ui))
        .route(handlers::docs::OPENAPI_PATH, get(handlers::docs::openapi_spec))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .nest("/reports", handlers::reports::router());

    let root_path = state.config.root_path().to_string();
    let app = if root_path == "/" {
        routes
    } else {
        Router::new().nest(&root_path, routes)
    };

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
    .with_state(state)
}
