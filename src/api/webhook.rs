//! Webhook handler for Gitea push events

use axum::{
    Extension,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::SharedState;
use crate::config::ConfigSnapshot;
use crate::error::error_body;
use crate::webhook::{self, DELIVERY_HEADER, EVENT_HEADER};

/// Handles the Gitea webhook POST request.
///
/// Method and signature are already checked by the guards in front of this
/// handler. A panic anywhere below is answered with 400 instead of taking the
/// server down.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    snapshot: Option<Extension<Arc<ConfigSnapshot>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let span = info_span!("webhook", delivery = %delivery);
    let snapshot = match snapshot {
        Some(Extension(snapshot)) => snapshot,
        None => state.config.snapshot(),
    };

    catch_panic(process_push(state, snapshot, headers, body).instrument(span)).await
}

async fn process_push(
    state: SharedState,
    snapshot: Arc<ConfigSnapshot>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event_type = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());

    let event = match webhook::decode(event_type, &body) {
        Ok(event) => event,
        Err(e) => {
            info!("Rejected webhook: {}", e);
            return e.into_response();
        }
    };

    info!("received webhook on {}", event.repo_full_name);

    state
        .dispatcher
        .dispatch(&event, &snapshot.config)
        .await
        .into_response()
}

/// Runs `fut` on its own task and turns a panic into a 400 response.
pub async fn catch_panic<F>(fut: F) -> Response
where
    F: Future<Output = Response> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(response) => response,
        Err(e) if e.is_panic() => {
            let reason = panic_reason(e.into_panic());
            error!("400:panic: {}", reason);
            let status = StatusCode::BAD_REQUEST;
            (status, error_body(status, format!("panic: {}", reason))).into_response()
        }
        Err(e) => {
            error!("Webhook task failed: {}", e);
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (status, error_body(status, e)).into_response()
        }
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(reason) => *reason,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(reason) => reason.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
