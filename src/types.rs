// src/types.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied correlation token attached to every transport message of
/// a run. Never interpreted.
pub type TaskIdentity = Value;

/// Result text the child reports when the job raised instead of returning.
pub const FAILED_SENTINEL: &str = "FAILED";

/// Default transport event name every run message is emitted under.
pub const DEFAULT_EVENT_NAME: &str = "sio_streamed_task_data";

/// Lifecycle discriminator carried in the `action` field of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "sio_streamed_task_started")]
    Started,
    #[serde(rename = "sio_streamed_task_output")]
    Output,
    #[serde(rename = "sio_streamed_task_finished")]
    Finished,
}

/// Payload of a single transport message.
///
/// ```json
/// {"identity": ..., "action": "sio_streamed_task_output", "output": "..."}
/// ```
///
/// `output` is only present for [`Action::Output`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub identity: TaskIdentity,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TaskEvent {
    pub fn started(identity: &TaskIdentity) -> Self {
        Self {
            identity: identity.clone(),
            action: Action::Started,
            output: None,
        }
    }

    pub fn output(identity: &TaskIdentity, chunk: String) -> Self {
        Self {
            identity: identity.clone(),
            action: Action::Output,
            output: Some(chunk),
        }
    }

    pub fn finished(identity: &TaskIdentity) -> Self {
        Self {
            identity: identity.clone(),
            action: Action::Finished,
            output: None,
        }
    }
}
