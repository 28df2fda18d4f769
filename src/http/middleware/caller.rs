//! Caller context middleware.
//! Identifies the calling user and the correlation id for the request.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use tracing::warn;

use crate::dispatch::Caller;

pub const X_USER_ID: &str = "x-user-id";
pub const X_REQUEST_ID: &str = "x-request-id";

/// Attach a `Caller` built from `X-User-Id` and `X-Request-Id`.
///
/// Requests without a user id are rejected; the request id is set by the
/// request-id layer upstream of this middleware.
pub async fn caller_context_middleware(mut req: Request<Body>, next: Next) -> impl IntoResponse {
    let user_id = match req
        .headers()
        .get(X_USER_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        Some(user_id) => user_id.to_string(),
        None => {
            warn!(path = %req.uri().path(), "Request without X-User-Id");
            return (StatusCode::UNAUTHORIZED, "Missing X-User-Id header").into_response();
        }
    };

    let correlation_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    req.extensions_mut().insert(Caller {
        user_id,
        correlation_id,
    });
    next.run(req).await
}
