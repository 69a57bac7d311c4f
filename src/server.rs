//! HTTP control surface.
//!
//! `/scan` accepts a streaming scan and returns immediately; `/cancel`
//! fires a running scan's cancel handle. `/jobs` and `/endpoints` are the
//! synchronous resume operations: enumeration+liveness from scratch, and
//! endpoint discovery replayed from a saved subdomain artifact.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::StageTuning;
use crate::pipeline::{self, ScanContext, ScanLogger, ScanRequest};
use crate::registry::ScanRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ScanRegistry>,
    pub ctx: Arc<ScanContext>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scan", post(scan_handler))
        .route("/cancel", post(cancel_handler))
        .route("/jobs", post(jobs_handler))
        .route("/endpoints", post(endpoints_handler))
        .with_state(state)
}

/// Binds and serves the control surface until the process exits.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding control surface to {addr}: {e}"))?;
    info!("control surface listening on http://{addr}/");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("control surface error: {e}"))
}

/// Starts a scan asynchronously and acknowledges right away.
async fn scan_handler(State(state): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let token = match state.registry.register(req.scan_id) {
        Ok(token) => token,
        Err(e) => {
            return Json(json!({ "ok": false, "message": e.to_string() })).into_response();
        }
    };

    info!("accepted scan {} for {}", req.scan_id, req.target);
    let reply = json!({ "ok": true, "scan_id": req.scan_id, "target": req.target });

    let registry = Arc::clone(&state.registry);
    let ctx = Arc::clone(&state.ctx);
    tokio::spawn(async move {
        pipeline::run_pipeline(req, ctx, registry, token).await;
    });

    Json(reply).into_response()
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    scan_id: i64,
}

async fn cancel_handler(
    State(state): State<AppState>,
    Json(req): Json<CancelRequest>,
) -> Response {
    if state.registry.cancel(req.scan_id) {
        info!("cancelled scan {}", req.scan_id);
        Json(json!({ "ok": true, "message": "scan cancelled" })).into_response()
    } else {
        Json(json!({ "ok": false, "message": "scan not found or already completed" }))
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct JobRequest {
    scan_id: i64,
    target: String,
    #[serde(default)]
    workers: Option<usize>,
}

/// Synchronous enumeration + liveness run; results land on disk and in the
/// response body, nothing is streamed to a backend.
async fn jobs_handler(State(state): State<AppState>, Json(req): Json<JobRequest>) -> Response {
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(16);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let result = pipeline::handle_job(
        &state.ctx,
        req.scan_id,
        &req.target,
        req.workers,
        &ScanLogger::Null,
        tx,
        &cancel,
    )
    .await;
    let _ = drain.await;

    match result {
        Ok(subdomains) => Json(json!({
            "scan_id": req.scan_id,
            "target": req.target,
            "subdomains": subdomains,
        }))
        .into_response(),
        Err(e) => {
            log::warn!("job failed for scan {}: {e}", req.scan_id);
            (StatusCode::INTERNAL_SERVER_ERROR, "job failed").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct EndpointsRequest {
    scan_id: i64,
    target: String,
}

/// Replays endpoint discovery from the saved subdomain artifact.
async fn endpoints_handler(
    State(state): State<AppState>,
    Json(req): Json<EndpointsRequest>,
) -> Response {
    let cancel = CancellationToken::new();
    let tuning = StageTuning::from_env();
    let (tx, mut rx) = mpsc::channel(16);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let result = pipeline::discover_endpoints(
        &state.ctx,
        &tuning,
        req.scan_id,
        &req.target,
        &ScanLogger::Null,
        tx,
        &cancel,
    )
    .await;
    let _ = drain.await;

    match result {
        Ok(endpoints) => Json(json!({
            "scan_id": req.scan_id,
            "target": req.target,
            "endpoints": endpoints,
        }))
        .into_response(),
        Err(e) => {
            log::warn!("endpoint discovery failed for scan {}: {e}", req.scan_id);
            (StatusCode::INTERNAL_SERVER_ERROR, "endpoint discovery failed").into_response()
        }
    }
}
