//! HTTP gateway for purchase settlement
//!
//! Thin layer over [`SettlementOrchestrator`](crate::settlement::SettlementOrchestrator):
//! request decoding, error envelope mapping and the OpenAPI document.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

/// Build the gateway router
pub fn router(state: Arc<AppState>) -> Router {
    let purchase_routes = Router::new()
        .route("/purchases", post(handlers::create_purchase))
        .route("/purchases/{purchase_id}", get(handlers::get_purchase))
        .route(
            "/purchases/{purchase_id}/recheck",
            post(handlers::recheck_purchase),
        )
        .route("/access", get(handlers::check_access));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1", purchase_routes)
        .with_state(state)
        // Swagger UI is stateless, merged after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Bind and serve until the listener fails
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "failed to bind {}: {} (port {} may already be in use)",
            addr,
            e,
            port
        )
    })?;

    tracing::info!(%addr, "Gateway listening");
    tracing::info!("API docs: http://{}/docs", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
