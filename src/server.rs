//! HTTP front door.
//!
//! - `GET /health` liveness probe
//! - `GET /scrape` runs one scrape + extract pass and returns the report
//!
//! Passes never overlap: a second `/scrape` waits for the running one.

use crate::api::AskModel;
use crate::models::format_duration;
use crate::pipeline::Pipeline;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct AppState<A> {
    pipeline: Arc<Mutex<Pipeline<A>>>,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
        }
    }
}

pub fn create_router<A: AskModel + 'static>(pipeline: Pipeline<A>) -> Router {
    let state = AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
    };
    Router::new()
        .route("/health", get(health))
        .route("/scrape", get(scrape::<A>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<A: AskModel + 'static>(pipeline: Pipeline<A>, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "khoborer_khoj server listening");
    axum::serve(listener, create_router(pipeline)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now().to_rfc3339() }))
}

async fn scrape<A: AskModel + 'static>(State(state): State<AppState<A>>) -> Response {
    info!("Manual scrape triggered");
    let t0 = Instant::now();
    let mut pipeline = state.pipeline.lock().await;
    match pipeline.run().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "Scrape failed");
            let body = json!({
                "success": false,
                "duration": format_duration(t0.elapsed()),
                "error": e.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
