//! Webhook event payloads and their mapping to script environments.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::executor::EnvVars;

/// A webhook payload that can trigger a script.
///
/// Each implementation names the `X-GitHub-Event` value it handles and
/// decides which of its fields reach the script as environment variables.
pub trait EventPayload: DeserializeOwned + Send + 'static {
    /// Value of the `X-GitHub-Event` header for this payload.
    const EVENT: &'static str;

    /// Environment passed to the script run for this event.
    fn script_env(&self) -> EnvVars;
}

/// The subset of a GitHub `push` payload that scripts care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub head_commit: HeadCommit,
}

/// The commit at the tip of a push.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

impl HeadCommit {
    /// First eight characters of the commit id, for log fields.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}

impl EventPayload for PushEvent {
    const EVENT: &'static str = "push";

    fn script_env(&self) -> EnvVars {
        let commit = &self.head_commit;
        vec![
            ("COMMIT_ID".to_string(), commit.id.clone()),
            ("COMMIT_MESSAGE".to_string(), commit.message.clone()),
            ("COMMIT_TIMESTAMP".to_string(), commit.timestamp.clone()),
            ("COMMIT_ADDED".to_string(), commit.added.join(",")),
            ("COMMIT_REMOVED".to_string(), commit.removed.join(",")),
            ("COMMIT_MODIFIED".to_string(), commit.modified.join(",")),
        ]
    }
}
