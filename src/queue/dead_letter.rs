//! Dead-letter envelope.
//!
//! Every dead-lettered message carries the complete original job (payload
//! included, exactly as received) plus `failedAt` and `error`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{jobs::Job, models::QueueError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterJob {
    #[serde(flatten)]
    pub job: Job,
    pub failed_at: DateTime<Utc>,
    pub error: String,
}

impl DeadLetterJob {
    pub fn new(job: Job, error: impl Into<String>) -> Self {
        Self::failed_at(job, error, Utc::now())
    }

    pub fn failed_at(job: Job, error: impl Into<String>, failed_at: DateTime<Utc>) -> Self {
        Self {
            job,
            failed_at,
            error: error.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, QueueError> {
        Ok(serde_json::to_vec(self)?)
    }
}
