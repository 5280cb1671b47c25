//! Health check endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use cache::Cache;
use ledger::{LedgerStore, RowQuery, Table};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub ledger: &'static str,
    pub cache: &'static str,
}

/// GET /health
///
/// Returns process liveness.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /ready
///
/// Checks the ledger and cache.
///
/// Only the ledger gates readiness; requests keep working with the cache down.
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let ledger = match state.store.query(RowQuery::new(Table::Orders).limit(1)).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "ledger readiness check failed");
            "unavailable"
        }
    };
    let cache = match state.cache.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "cache readiness check failed");
            "unavailable"
        }
    };

    let (code, status) = if ledger == "ok" {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        code,
        Json(ReadyResponse {
            status,
            ledger,
            cache,
        }),
    )
}
