//! HTTP layer: request guards and the webhook handler

pub mod guard;
pub mod webhook;

pub use guard::{require_post, verify_signature};
pub use webhook::handle_webhook;
