use serde::{Deserialize, Serialize};

/// Status changes published by the executor over an explicit channel.
///
/// Consumers subscribe once via
/// [`QueueManager::take_events`](crate::QueueManager::take_events); there
/// is no global listener registration. A retried attempt produces a
/// `Failed { terminal: false }` followed later by a fresh `Started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    #[serde(rename_all = "camelCase")]
    Started { job_id: String, attempt: u32 },

    #[serde(rename_all = "camelCase")]
    Completed {
        job_id: String,
        output: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Failed {
        job_id: String,
        error: String,
        /// `true` once the attempt budget is exhausted
        terminal: bool,
    },
}

impl QueueEvent {
    pub fn job_id(&self) -> &str {
        match self {
            QueueEvent::Started { job_id, .. }
            | QueueEvent::Completed { job_id, .. }
            | QueueEvent::Failed { job_id, .. } => job_id,
        }
    }
}
