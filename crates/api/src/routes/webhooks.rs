//! Payment gateway webhook receiver.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use domain::payment::WebhookOutcome;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the gateway's signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
}

fn outcome_name(outcome: WebhookOutcome) -> &'static str {
    match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::AlreadyApplied => "already_applied",
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::Ignored => "ignored",
    }
}

/// POST /api/v1/webhooks/stripe
///
/// The raw body is verified before it is parsed.
#[tracing::instrument(skip(state, headers, body))]
pub async fn stripe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookResponse {
        received: true,
        outcome: outcome_name(outcome),
    }))
}
