//! Request gates that run before the webhook handler

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State as AxumState},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::SharedState;
use crate::error::HookError;
use crate::signature::{self, FALLBACK_SIGNATURE_HEADER, SIGNATURE_HEADER};

/// Largest webhook body accepted.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Rejects anything that is not a POST with 405.
pub async fn require_post(request: Request, next: Next) -> Response {
    if request.method() != Method::POST {
        warn!("Rejected {} {}", request.method(), request.uri());
        let status = StatusCode::METHOD_NOT_ALLOWED;
        let text = status.canonical_reason().unwrap_or_default();
        return (status, format!("{}\n", text)).into_response();
    }
    next.run(request).await
}

/// Checks the body signature against the shared secret of the active config.
///
/// The body is buffered here and handed on unchanged, so the handler never
/// sees a request whose signature did not verify.
pub async fn verify_signature(
    AxumState(state): AxumState<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = HookError::BodyRead(e.to_string());
            warn!("{}", err);
            return err.into_response();
        }
    };

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .or_else(|| parts.headers.get(FALLBACK_SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok());

    let snapshot = state.config.snapshot();
    match signature {
        Some(sig) if signature::verify(&snapshot.config.secret, &body, sig) => {}
        Some(_) => return unauthorized("Invalid webhook signature"),
        None => return unauthorized("Missing webhook signature"),
    }

    // The rest of the request runs against the snapshot the signature was checked with.
    parts.extensions.insert(snapshot);
    next.run(Request::from_parts(parts, Body::from(body))).await
}

fn unauthorized(reason: &str) -> Response {
    warn!("{}", reason);
    HookError::AuthFailed(reason.to_string()).into_response()
}
