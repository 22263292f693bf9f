//! Gitea push webhook receiver that runs configured commands for the pushed repository.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod server;
pub mod signature;
pub mod webhook;

use std::sync::Arc;

use config::ConfigStore;
use dispatch::CommandDispatcher;

pub use config::{HookConfig, RepositoryRule};
pub use error::{HookError, Result};
pub use webhook::PushEvent;

pub struct AppState {
    pub config: ConfigStore,
    pub dispatcher: CommandDispatcher,
}

impl AppState {
    /// The concurrency cap is read once here; changing it needs a restart.
    pub fn new(config: ConfigStore) -> Self {
        let max_concurrent = config.snapshot().config.max_concurrent_commands;
        Self {
            config,
            dispatcher: CommandDispatcher::new(max_concurrent),
        }
    }
}

pub type SharedState = Arc<AppState>;
