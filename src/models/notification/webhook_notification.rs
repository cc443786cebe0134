use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::JobResult;

/// Orchestrator record that a webhook update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTarget {
    Property(u64),
    Transfer(u64),
}

impl fmt::Display for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationTarget::Property(id) => write!(f, "properties/{}", id),
            NotificationTarget::Transfer(id) => write!(f, "transfers/{}", id),
        }
    }
}

impl NotificationTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationTarget::Property(_) => "property",
            NotificationTarget::Transfer(_) => "transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookUpdatePayload {
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub job_id: String,
    pub status: WebhookStatus,
    /// e.g. `PENDING_APPROVALS`, `EXECUTED`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<String>,
}

/// Builds the update for a successful result. Results without a transaction
/// hash have nothing to report and yield `None`.
pub fn produce_blockchain_update_payload(
    job_id: &str,
    result: &JobResult,
) -> Option<WebhookUpdatePayload> {
    if !result.success {
        return None;
    }
    let transaction_hash = result.tx_hash.clone()?;

    Some(WebhookUpdatePayload {
        transaction_hash,
        request_hash: result.request_hash.clone(),
        block_number: result.block_number,
        job_id: job_id.to_string(),
        status: WebhookStatus::Success,
        approval_status: result.status.clone(),
    })
}
