//! Payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::{PaymentId, UserId};
use domain::payment::{CreateIntent, Payment, PaymentFilter, PaymentStatus, Refund, RefundPayment};
use domain::{DomainError, Page, Window};
use serde::{Deserialize, Serialize};

use super::user_from_headers;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ConfirmRequest {
    #[serde(alias = "payment_method_id")]
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct IntentResponse {
    pub payment_id: PaymentId,
    pub client_secret: String,
    pub payment: Payment,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub payment: Payment,
    pub refund: Refund,
}

// -- Handlers --

/// POST /api/v1/payments/intent
#[tracing::instrument(skip(state, headers, payload))]
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateIntent>, JsonRejection>,
) -> Result<(StatusCode, Json<IntentResponse>), ApiError> {
    let Json(mut cmd) = payload?;
    if let Some(user_id) = user_from_headers(&headers) {
        cmd.user_id = user_id;
    }

    let created = state.payments.create_intent(cmd).await?;
    Ok((
        StatusCode::CREATED,
        Json(IntentResponse {
            payment_id: created.payment.id.clone(),
            client_secret: created.client_secret,
            payment: created.payment,
        }),
    ))
}

/// POST /api/v1/payments/{id}/confirm
#[tracing::instrument(skip(state, payload))]
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<Payment>, ApiError> {
    let Json(req) = payload?;
    let payment = state
        .payments
        .confirm(&PaymentId::new(id), &req.payment_method)
        .await?;
    Ok(Json(payment))
}

/// POST /api/v1/payments/{id}/refund
///
/// An empty body refunds the full amount.
#[tracing::instrument(skip(state, body))]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<RefundResponse>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RefundPayment::full()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid refund request: {e}")))?
    };

    let (payment, refund) = state.payments.refund(&PaymentId::new(id), request).await?;
    Ok(Json(RefundResponse { payment, refund }))
}

/// GET /api/v1/payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state.payments.get(&PaymentId::new(id)).await?;
    Ok(Json(payment))
}

/// GET /api/v1/payments/{id}/refunds
#[tracing::instrument(skip(state))]
pub async fn list_refunds(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Refund>>, ApiError> {
    let refunds = state.payments.list_refunds(&PaymentId::new(id)).await?;
    Ok(Json(refunds))
}

/// GET /api/v1/payments
///
/// Filters by user, order or status. Newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<Payment>>, ApiError> {
    let Query(params) = params?;
    let status = params
        .status
        .as_deref()
        .map(|s| s.trim().to_lowercase().parse::<PaymentStatus>())
        .transpose()
        .map_err(DomainError::validation)?;

    let filter = PaymentFilter {
        user_id: params.user_id.map(UserId::new),
        order_id: params.order_id,
        status,
        window: Window::new(params.limit, params.offset),
    };
    let page = state.payments.list(filter).await?;
    Ok(Json(page))
}
