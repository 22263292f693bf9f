//! Push event payload decoding

use serde::Deserialize;
use tracing::error;

use crate::error::{HookError, Result};

/// Header carrying the Gitea event type.
pub const EVENT_HEADER: &str = "X-Gitea-Event";
/// Header carrying the Gitea delivery id.
pub const DELIVERY_HEADER: &str = "X-Gitea-Delivery";
/// The only event type this receiver acts on.
pub const PUSH_EVENT: &str = "push";

/// Data extracted from a push payload.
/// This data is passed to commands as environment variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushEvent {
    pub repo_full_name: String,
    pub repo_html_url: String,
    pub repo_owner_email: String,
    pub git_ref: String,
    pub head_commit_id: String,
    pub head_commit_author_email: String,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: PayloadRepository,
    // null when a branch is deleted
    #[serde(default)]
    head_commit: Option<PayloadCommit>,
}

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    full_name: String,
    html_url: String,
    #[serde(default)]
    owner: Option<PayloadUser>,
}

#[derive(Debug, Deserialize)]
struct PayloadCommit {
    id: String,
    #[serde(default)]
    author: Option<PayloadUser>,
}

#[derive(Debug, Deserialize)]
struct PayloadUser {
    #[serde(default)]
    email: String,
}

impl From<PushPayload> for PushEvent {
    fn from(payload: PushPayload) -> Self {
        let owner_email = payload
            .repository
            .owner
            .map(|owner| owner.email)
            .unwrap_or_default();
        let (head_commit_id, head_commit_author_email) = match payload.head_commit {
            Some(commit) => (
                commit.id,
                commit.author.map(|a| a.email).unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };

        PushEvent {
            repo_full_name: payload.repository.full_name,
            repo_html_url: payload.repository.html_url,
            repo_owner_email: owner_email,
            git_ref: payload.git_ref,
            head_commit_id,
            head_commit_author_email,
        }
    }
}

/// Decodes a webhook body into a [`PushEvent`].
///
/// Any event type other than `push` is rejected before the body is looked at.
/// On malformed JSON the raw body is logged base64-encoded so binary garbage
/// cannot break the log stream; the caller only sees the parse error.
pub fn decode(event_type: Option<&str>, body: &[u8]) -> Result<PushEvent> {
    match event_type {
        Some(PUSH_EVENT) => {}
        Some(other) => return Err(HookError::UnsupportedEvent(other.to_string())),
        None => return Err(HookError::UnsupportedEvent(String::new())),
    }

    let payload: PushPayload = serde_json::from_slice(body).map_err(|e| {
        error!(
            "Could not parse push payload: {} (body base64: {})",
            e,
            base64::encode(body)
        );
        HookError::DecodeError(e.to_string())
    })?;

    Ok(payload.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUSH_BODY: &str = r#"{
        "ref": "refs/heads/main",
        "before": "0000000000000000000000000000000000000000",
        "after": "c0ffee",
        "head_commit": {
            "id": "c0ffee",
            "message": "Fix build\n",
            "author": { "name": "Dev", "email": "dev@example.com", "username": "dev" }
        },
        "repository": {
            "id": 1,
            "full_name": "org/repo",
            "html_url": "https://git.example.com/org/repo",
            "owner": { "id": 2, "login": "org", "email": "owner@example.com" }
        }
    }"#;

    #[test]
    fn decodes_push_payload() {
        let event = decode(Some("push"), PUSH_BODY.as_bytes()).unwrap();
        assert_eq!(
            event,
            PushEvent {
                repo_full_name: "org/repo".into(),
                repo_html_url: "https://git.example.com/org/repo".into(),
                repo_owner_email: "owner@example.com".into(),
                git_ref: "refs/heads/main".into(),
                head_commit_id: "c0ffee".into(),
                head_commit_author_email: "dev@example.com".into(),
            }
        );
    }

    #[test]
    fn null_head_commit_leaves_commit_fields_empty() {
        let body = r#"{
            "ref": "refs/heads/old",
            "head_commit": null,
            "repository": { "full_name": "org/repo", "html_url": "https://git.example.com/org/repo" }
        }"#;
        let event = decode(Some("push"), body.as_bytes()).unwrap();
        assert_eq!(event.git_ref, "refs/heads/old");
        assert!(event.head_commit_id.is_empty());
        assert!(event.head_commit_author_email.is_empty());
        assert!(event.repo_owner_email.is_empty());
    }

    #[test]
    fn rejects_other_events_regardless_of_body() {
        let err = decode(Some("issues"), PUSH_BODY.as_bytes()).unwrap_err();
        assert!(matches!(err, HookError::UnsupportedEvent(ref e) if e == "issues"));

        let err = decode(None, PUSH_BODY.as_bytes()).unwrap_err();
        assert!(matches!(err, HookError::UnsupportedEvent(_)));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode(Some("push"), b"\xff\xfe not json").unwrap_err();
        assert!(matches!(err, HookError::DecodeError(_)));
    }

    #[test]
    fn missing_html_url_is_a_decode_error() {
        let body = r#"{ "ref": "refs/heads/main", "repository": { "full_name": "org/repo" } }"#;
        let err = decode(Some("push"), body.as_bytes()).unwrap_err();
        assert!(matches!(err, HookError::DecodeError(ref e) if e.contains("html_url")));
    }

    #[test]
    fn missing_repository_is_a_decode_error() {
        let err = decode(Some("push"), br#"{ "ref": "refs/heads/main" }"#).unwrap_err();
        assert!(matches!(err, HookError::DecodeError(_)));
    }
}
