//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::{Money, OrderId, UserId};
use domain::order::{CreateOrder, Order, OrderItem, OrderStatus, UpdateOrder, validate_items};
use domain::{DomainError, Page, Pagination};
use serde::{Deserialize, Serialize};

use super::user_from_headers;
use crate::{AppState, Orders};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Deserialize)]
pub struct CalculateTotalRequest {
    pub items: Vec<OrderItem>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct TotalResponse {
    pub total: Money,
    pub item_count: usize,
}

// -- Handlers --

/// POST /api/v1/orders
///
/// Creates an order owned by the `X-User-ID` caller.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(mut cmd) = payload?;
    if let Some(user_id) = user_from_headers(&headers) {
        cmd.user_id = user_id;
    }

    let order = state.orders.create_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /api/v1/orders/calculate-total
///
/// Prices a list of items without storing anything.
pub async fn calculate_total(
    payload: Result<Json<CalculateTotalRequest>, JsonRejection>,
) -> Result<Json<TotalResponse>, ApiError> {
    let Json(req) = payload?;
    validate_items(&req.items)?;

    Ok(Json(TotalResponse {
        total: Orders::calculate_total(&req.items)?,
        item_count: req.items.len(),
    }))
}

/// GET /api/v1/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.get_order(parse_order_id(&id)?).await?;
    Ok(Json(order))
}

/// PUT /api/v1/orders/{id}
///
/// Edits items, addresses or notes.
#[tracing::instrument(skip(state, payload))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateOrder>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let Json(cmd) = payload?;

    let order = state.orders.update_order(order_id, cmd).await?;
    Ok(Json(order))
}

/// PUT /api/v1/orders/{id}/status
#[tracing::instrument(skip(state, payload))]
pub async fn transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let Json(req) = payload?;
    let status = parse_status(&req.status)?;

    let order = state
        .orders
        .transition_status(order_id, status, req.tracking_number)
        .await?;
    Ok(Json(order))
}

/// POST /api/v1/orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.cancel_order(parse_order_id(&id)?).await?;
    Ok(Json(order))
}

/// GET /api/v1/users/{user_id}/orders
///
/// Newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list_by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<Order>>, ApiError> {
    let Query(params) = params?;
    let pagination = Pagination::new(params.page, params.limit);

    let page = state
        .orders
        .list_by_user(&UserId::new(user_id), pagination)
        .await?;
    Ok(Json(page))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

fn parse_status(status: &str) -> Result<OrderStatus, ApiError> {
    status
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|e: String| ApiError::from(DomainError::validation(e)))
}
