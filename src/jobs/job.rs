//! Job envelope consumed from the work queue, and the typed task it decodes into.
//!
//! The envelope keeps the raw payload, the producer's `createdAt` and any
//! keys it does not model, so that a dead-lettered job carries exactly what
//! the producer sent. The typed [`JobTask`] is derived from it on
//! demand; the executor only ever sees the typed form.
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
    models::{JobValidationError, NotificationTarget},
    utils::deserialize_optional_id,
};

/// Wire format of a job on the queue (camelCase JSON).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub payload: Value,
    /// Producer metadata, never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    pub fn new(job_type: JobType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type: job_type.to_string(),
            payload,
            created_at: Some(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            attempts: 0,
            max_attempts: None,
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Attempt budget for this job, falling back to the process-wide default.
    /// A budget of zero still allows the first execution.
    pub fn max_attempts_or(&self, default_max_attempts: u32) -> u32 {
        self.max_attempts.unwrap_or(default_max_attempts).max(1)
    }

    /// Decodes the raw payload into the typed task for this job's type.
    pub fn task(&self) -> Result<JobTask, JobValidationError> {
        let job_type = JobType::from_str(&self.job_type)
            .map_err(|_| JobValidationError::UnknownJobType(self.job_type.clone()))?;

        let task = match job_type {
            JobType::RegisterProperty => {
                let mut payload: RegisterPropertyPayload = decode(job_type, &self.payload)?;
                payload.body = self.payload.clone();
                JobTask::RegisterProperty(payload)
            }
            JobType::ConfigureTransfer => {
                JobTask::ConfigureTransfer(decode(job_type, &self.payload)?)
            }
            JobType::ApproveTransfer => JobTask::ApproveTransfer(decode(job_type, &self.payload)?),
            JobType::AcceptTransfer => JobTask::AcceptTransfer(decode(job_type, &self.payload)?),
            JobType::ExecuteTransfer => JobTask::ExecuteTransfer(decode(job_type, &self.payload)?),
            JobType::RegisterApprover => {
                JobTask::RegisterApprover(decode(job_type, &self.payload)?)
            }
            JobType::FreezeProperty => JobTask::FreezeProperty(decode(job_type, &self.payload)?),
            JobType::UnfreezeProperty => {
                JobTask::UnfreezeProperty(decode(job_type, &self.payload)?)
            }
        };

        Ok(task)
    }
}

fn decode<T: DeserializeOwned>(job_type: JobType, payload: &Value) -> Result<T, JobValidationError> {
    serde_json::from_value(payload.clone()).map_err(|e| JobValidationError::InvalidPayload {
        job_type: job_type.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    RegisterProperty,
    ConfigureTransfer,
    ApproveTransfer,
    AcceptTransfer,
    ExecuteTransfer,
    RegisterApprover,
    FreezeProperty,
    UnfreezeProperty,
}

/// One variant per job type; dispatch over it is exhaustive.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTask {
    RegisterProperty(RegisterPropertyPayload),
    ConfigureTransfer(ConfigureTransferPayload),
    ApproveTransfer(ApproveTransferPayload),
    AcceptTransfer(AcceptTransferPayload),
    ExecuteTransfer(ExecuteTransferPayload),
    RegisterApprover(RegisterApproverPayload),
    FreezeProperty(PropertyFreezePayload),
    UnfreezeProperty(PropertyFreezePayload),
}

impl JobTask {
    pub fn job_type(&self) -> JobType {
        match self {
            JobTask::RegisterProperty(_) => JobType::RegisterProperty,
            JobTask::ConfigureTransfer(_) => JobType::ConfigureTransfer,
            JobTask::ApproveTransfer(_) => JobType::ApproveTransfer,
            JobTask::AcceptTransfer(_) => JobType::AcceptTransfer,
            JobTask::ExecuteTransfer(_) => JobType::ExecuteTransfer,
            JobTask::RegisterApprover(_) => JobType::RegisterApprover,
            JobTask::FreezeProperty(_) => JobType::FreezeProperty,
            JobTask::UnfreezeProperty(_) => JobType::UnfreezeProperty,
        }
    }

    /// Orchestrator record to update once the task has settled on chain.
    pub fn notification_target(&self) -> Option<NotificationTarget> {
        let (property_id, transfer_id) = match self {
            JobTask::RegisterProperty(p) => (p.property_id.as_deref(), None),
            JobTask::FreezeProperty(p) | JobTask::UnfreezeProperty(p) => {
                (p.property_id.as_deref(), None)
            }
            JobTask::ConfigureTransfer(p) => (None, p.transfer_id.as_deref()),
            JobTask::ApproveTransfer(p) => (None, p.transfer_id.as_deref()),
            JobTask::AcceptTransfer(p) => (None, p.transfer_id.as_deref()),
            JobTask::ExecuteTransfer(p) => (None, p.transfer_id.as_deref()),
            JobTask::RegisterApprover(_) => (None, None),
        };

        if let Some(id) = property_id.and_then(|id| id.parse().ok()) {
            return Some(NotificationTarget::Property(id));
        }
        transfer_id
            .and_then(|id| id.parse().ok())
            .map(NotificationTarget::Transfer)
    }
}

/// Typed view used for validation and notification routing. The registry API
/// receives `body`, the payload exactly as the producer sent it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPropertyPayload {
    pub matricula_id: String,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub property_id: Option<String>,
    #[serde(skip)]
    pub body: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureTransferPayload {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub transfer_id: Option<String>,
    pub matricula_id: String,
    #[serde(alias = "from")]
    pub seller: String,
    #[serde(alias = "to")]
    pub buyer: String,
    #[serde(default)]
    pub approvers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApproveTransferPayload {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub transfer_id: Option<String>,
    pub matricula_id: String,
    pub approver_address: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTransferPayload {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub transfer_id: Option<String>,
    pub matricula_id: String,
    pub buyer_address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTransferPayload {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub transfer_id: Option<String>,
    pub matricula_id: String,
    pub seller: String,
    pub buyer: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterApproverPayload {
    pub name: String,
    #[serde(alias = "wallet")]
    pub wallet_address: String,
    #[serde(default, alias = "approverType")]
    pub entity_type: Option<Value>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Shared by freeze and unfreeze.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFreezePayload {
    pub matricula_id: String,
    pub wallet: String,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub property_id: Option<String>,
}
