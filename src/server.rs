use axum::{Router, extract::DefaultBodyLimit, middleware};
use tracing::{error, info, warn};

use crate::SharedState;
use crate::api::guard::MAX_BODY_BYTES;
use crate::api::{handle_webhook, require_post, verify_signature};
use crate::config::ConfigSnapshot;
use crate::error::{HookError, Result};

/// Every path goes to the webhook handler, behind the method and signature guards.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .fallback(handle_webhook)
        .layer(middleware::from_fn_with_state(state.clone(), verify_signature))
        .layer(middleware::from_fn(require_post))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Binds the configured address and serves until the listener fails.
pub async fn serve(state: SharedState) -> Result<()> {
    let address = state.config.snapshot().config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| HookError::BindFailed {
            address: address.clone(),
            source,
        })?;

    info!("Listening on {}", address);
    info!("Using config at {:?}", state.config.source());

    tokio::spawn(watch_reload_signal(state.clone(), address));

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Reloads the configuration and reports what changed.
///
/// A failed reload leaves the previous configuration active.
pub fn reload_config(state: &SharedState, bound_address: &str) -> Result<()> {
    match state.config.reload() {
        Ok(snapshot) => {
            info!(
                "config reloaded from {:?} (generation {}, loaded at {})",
                state.config.source(),
                snapshot.generation,
                snapshot.loaded_at.to_rfc3339()
            );
            warn_on_static_changes(&snapshot, bound_address);
            Ok(())
        }
        Err(e) => {
            error!("Failed to reload config, keeping the previous one: {}", e);
            Err(e)
        }
    }
}

fn warn_on_static_changes(snapshot: &ConfigSnapshot, bound_address: &str) {
    let address = snapshot.config.listen_address();
    if address != bound_address {
        warn!(
            "Listen address changed to {}, still serving on {} until restart",
            address, bound_address
        );
    }
}

#[cfg(unix)]
async fn watch_reload_signal(state: SharedState, bound_address: String) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed setting up SIGHUP handler, reload disabled: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("Got SIGHUP, reloading configuration");
        let _ = reload_config(&state, &bound_address);
    }
}

#[cfg(not(unix))]
async fn watch_reload_signal(_state: SharedState, _bound_address: String) {
    tracing::debug!("Signal-triggered reload is not supported on non-unix systems.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;
    use crate::config::ConfigStore;
    use std::sync::Arc;

    fn state_with(dir: &tempfile::TempDir, content: &str) -> SharedState {
        let path = dir.path().join("config.json");
        std::fs::write(&path, content).unwrap();
        Arc::new(AppState::new(ConfigStore::open(path).unwrap()))
    }

    #[test]
    fn reload_picks_up_new_secret() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(&dir, r#"{ "port": 8080, "secret": "one" }"#);

        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "port": 8080, "secret": "two" }"#,
        )
        .unwrap();
        let first_loaded_at = state.config.snapshot().loaded_at;
        reload_config(&state, "0.0.0.0:8080").unwrap();

        let current = state.config.snapshot();
        assert_eq!(current.config.secret, "two");
        assert!(current.loaded_at >= first_loaded_at);
    }

    #[test]
    fn broken_reload_is_reported_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(&dir, r#"{ "port": 8080, "secret": "one" }"#);

        let loaded_at = state.config.snapshot().loaded_at;
        std::fs::write(dir.path().join("config.json"), "{").unwrap();
        assert!(reload_config(&state, "0.0.0.0:8080").is_err());

        assert_eq!(state.config.snapshot().loaded_at, loaded_at);
        assert_eq!(state.config.snapshot().config.secret, "one");
        assert_eq!(state.config.snapshot().generation, 1);
    }
}
