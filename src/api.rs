//! HTTP read API and source management routes.
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | GET | `/api/incidents` | every stored incident |
//! | GET | `/api/incidents/:id` | one incident, 404 if unknown |
//! | GET | `/api/stats` | [`Stats`] |
//! | POST | `/api/scrape` | run a cycle now, [`ScrapeResponse`] |
//! | GET | `/api/sources` | registered sources with their enabled flag |
//! | POST | `/api/sources/:id/enable` | updated [`SourceInfo`] |
//! | POST | `/api/sources/:id/disable` | updated [`SourceInfo`] |
//! | POST | `/api/sources/:id/scrape` | run one source; results are not stored |
//! | GET | `/health` | `{"status":"ok"}` |
//!
//! There is no authentication and no write access to incidents.

use crate::models::{Incident, ScrapeResponse, SourceInfo, Stats};
use crate::monitor::Monitor;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, instrument};

type ApiError = (StatusCode, &'static str);

#[derive(Debug, Serialize)]
pub struct HealthRes {
    pub status: &'static str,
}

/// Build the router over a shared [`Monitor`].
pub fn router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/incidents", get(list_incidents))
        .route("/api/incidents/:id", get(get_incident))
        .route("/api/stats", get(stats))
        .route("/api/scrape", post(trigger_scrape))
        .route("/api/sources", get(list_sources))
        .route("/api/sources/:id/enable", post(enable_source))
        .route("/api/sources/:id/disable", post(disable_source))
        .route("/api/sources/:id/scrape", post(scrape_source))
        .layer(CorsLayer::permissive())
        .with_state(monitor)
}

/// Serve the API on `bind` until `shutdown` fires.
pub async fn serve(
    monitor: Arc<Monitor>,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(monitor))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health() -> Json<HealthRes> {
    Json(HealthRes { status: "ok" })
}

async fn list_incidents(State(monitor): State<Arc<Monitor>>) -> Json<Vec<Incident>> {
    Json(monitor.store().read().await.all().to_vec())
}

async fn get_incident(
    State(monitor): State<Arc<Monitor>>,
    Path(id): Path<String>,
) -> Result<Json<Incident>, ApiError> {
    monitor
        .store()
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Incident not found"))
}

async fn stats(State(monitor): State<Arc<Monitor>>) -> Json<Stats> {
    Json(monitor.store().read().await.stats())
}

#[instrument(level = "info", skip_all)]
async fn trigger_scrape(State(monitor): State<Arc<Monitor>>) -> Json<ScrapeResponse> {
    Json(monitor.trigger().await)
}

async fn list_sources(State(monitor): State<Arc<Monitor>>) -> Json<Vec<SourceInfo>> {
    Json(monitor.gateway().list_sources())
}

fn set_source_enabled(monitor: &Monitor, id: &str, enabled: bool) -> Result<Json<SourceInfo>, ApiError> {
    if !monitor.gateway().set_enabled(id, enabled) {
        return Err((StatusCode::NOT_FOUND, "Source not found"));
    }
    monitor
        .gateway()
        .source_info(id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Source not found"))
}

async fn enable_source(
    State(monitor): State<Arc<Monitor>>,
    Path(id): Path<String>,
) -> Result<Json<SourceInfo>, ApiError> {
    set_source_enabled(&monitor, &id, true)
}

async fn disable_source(
    State(monitor): State<Arc<Monitor>>,
    Path(id): Path<String>,
) -> Result<Json<SourceInfo>, ApiError> {
    set_source_enabled(&monitor, &id, false)
}

#[instrument(level = "info", skip_all, fields(source = %id))]
async fn scrape_source(
    State(monitor): State<Arc<Monitor>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    monitor
        .gateway()
        .scrape_one(&id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Source not found"))
}
