use gitea_hook_runner::config::ConfigStore;
use gitea_hook_runner::{AppState, logging, server};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CONFIG_PATH").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let store = match ConfigStore::open(&config_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let log_guard = match logging::setup_logging(&store.snapshot().config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Starting gitea_hook_runner {}", env!("CARGO_PKG_VERSION"));
    let state = Arc::new(AppState::new(store));

    if let Err(e) = server::serve(state).await {
        error!("{}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}
