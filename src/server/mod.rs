/// HTTP API for eco-anchor.
///
/// A thin layer over the store and the anchoring service:
/// - CRUD over measurements
/// - fire-and-forget anchoring after each successful insert
/// - `/measurements/{sensor_id}/verify` for the trust verdict
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::workflow::AnchorService;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: AnchorService,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::measurement_routes())
        .with_state(Arc::new(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server and run until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> crate::error::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(crate::error::AnchorError::Io)?;

    tracing::info!("eco-anchor API server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(crate::error::AnchorError::Io)?;

    Ok(())
}
