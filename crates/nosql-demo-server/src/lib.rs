pub mod embed;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with the page, API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        // Page
        .route("/", get(routes::page::index))
        // Demo
        .route("/api/demo", get(routes::demo::get_demo))
        .route("/api/demo/run", post(routes::demo::run_demo))
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Static assets
        .route("/assets/{*path}", get(embed::asset_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serve the demo on a pre-bound listener.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// first (useful when port 0 lets the OS pick). Runs until the future is
/// dropped.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    app_state: AppState,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(app_state);

    tracing::info!("demo listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
