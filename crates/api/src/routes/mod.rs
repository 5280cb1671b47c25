//! HTTP handlers, one module per resource.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod webhooks;

use axum::http::HeaderMap;
use common::UserId;

/// Header carrying the authenticated caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Returns the caller's user id from the request headers, if present.
pub(crate) fn user_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::new)
}
