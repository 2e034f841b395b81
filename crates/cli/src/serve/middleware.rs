//! HTTP middleware: API key authentication and caller identification.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use coldchain_core::Identity;
use tracing::{debug, warn};

use super::state::{AppState, Caller};

pub(crate) const CALLER_HEADER: &str = "x-caller-identity";

/// POST routes that change nothing and so need no caller.
const UNIDENTIFIED_POSTS: &[&str] = &["/process-ingredients"];

/// API key check: runs before caller resolution so an unauthenticated
/// client cannot name a caller at all.
///
/// With no key configured every request passes. Otherwise every path except
/// `/health` needs `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected_key = match &state.api_key {
        Some(k) => k,
        None => return next.run(request).await,
    };

    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    if let Some(token) = auth_header.and_then(|auth| auth.strip_prefix("Bearer ")) {
        if token == expected_key {
            return next.run(request).await;
        }
        return forbidden(&request);
    }

    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if let Some(key) = api_key_header {
        if key == expected_key {
            return next.run(request).await;
        }
        return forbidden(&request);
    }

    super::json_error(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "authentication required",
    )
    .into_response()
}

fn forbidden(request: &Request<axum::body::Body>) -> Response {
    warn!(
        method = %request.method(),
        path = request.uri().path(),
        "rejected request with invalid API key"
    );
    super::json_error(StatusCode::FORBIDDEN, "forbidden", "invalid API key").into_response()
}

/// Resolve the caller from `X-Caller-Identity` and attach it to the request.
///
/// Mutating requests without a usable header are refused with 401. Reads
/// pass through; a header on a read is still attached.
pub(crate) async fn caller_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let caller = request
        .headers()
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| Identity::new(raw).ok());

    let mutating = request.method() == Method::POST
        && !UNIDENTIFIED_POSTS.contains(&request.uri().path());

    match caller {
        Some(identity) => {
            debug!(
                caller = %identity,
                method = %request.method(),
                path = request.uri().path(),
                "request"
            );
            request.extensions_mut().insert(Caller(identity));
            next.run(request).await
        }
        None if mutating => super::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "X-Caller-Identity header required",
        )
        .into_response(),
        None => next.run(request).await,
    }
}
