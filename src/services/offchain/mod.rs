//! Job executor backed by the offchain registry HTTP API.
//!
//! Each [`JobTask`] variant maps to one endpoint. Non-2xx responses come back
//! as `success: false` results; transport failures and timeouts are raised as
//! [`OffchainClientError`]. The job processor treats both the same way.
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::{
    constants::{
        ACCEPT_TRANSFER_PATH, APPROVE_TRANSFER_PATH, CONFIGURE_TRANSFER_PATH,
        EXECUTE_TRANSFER_PATH, FREEZE_PROPERTY_PATH, REGISTER_APPROVER_PATH,
        REGISTER_PROPERTY_PATH, UNFREEZE_PROPERTY_PATH,
    },
    jobs::JobTask,
    models::JobResult,
};

#[derive(Debug, Error)]
pub enum OffchainClientError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Request timed out after {0}")]
    Timeout(String),
}

/// Boundary to whatever performs the domain work for a job.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, task: &JobTask) -> Result<JobResult, OffchainClientError>;
}

#[derive(Debug, Clone)]
pub struct OffchainClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

struct Route {
    path: &'static str,
    body: Value,
    success_message: &'static str,
}

impl OffchainClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OffchainClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn route(task: &JobTask) -> Route {
        match task {
            // forwarded as received, including fields this worker does not model
            JobTask::RegisterProperty(payload) => Route {
                path: REGISTER_PROPERTY_PATH,
                body: payload.body.clone(),
                success_message: "Property registration request created successfully",
            },
            JobTask::ConfigureTransfer(payload) => Route {
                path: CONFIGURE_TRANSFER_PATH,
                body: json!({
                    "from": payload.seller,
                    "to": payload.buyer,
                    "matriculaId": payload.matricula_id,
                    "approvers": payload.approvers,
                }),
                success_message: "Transfer configured successfully",
            },
            JobTask::ApproveTransfer(payload) => Route {
                path: APPROVE_TRANSFER_PATH,
                body: json!({
                    "from": payload.from,
                    "to": payload.to,
                    "matriculaId": payload.matricula_id,
                    "approverAddress": payload.approver_address,
                }),
                success_message: "Transfer approved successfully",
            },
            JobTask::AcceptTransfer(payload) => Route {
                path: ACCEPT_TRANSFER_PATH,
                body: json!({
                    "transferId": payload.transfer_id,
                    "matriculaId": payload.matricula_id,
                    "buyerAddress": payload.buyer_address,
                }),
                success_message: "Transfer accepted successfully",
            },
            JobTask::ExecuteTransfer(payload) => Route {
                path: EXECUTE_TRANSFER_PATH,
                body: json!({
                    "transferId": payload.transfer_id,
                    "matriculaId": payload.matricula_id,
                    "seller": payload.seller,
                    "buyer": payload.buyer,
                }),
                success_message: "Transfer executed successfully",
            },
            JobTask::RegisterApprover(payload) => Route {
                path: REGISTER_APPROVER_PATH,
                body: json!({
                    "name": payload.name,
                    "walletAddress": payload.wallet_address,
                    "entityType": payload.entity_type,
                }),
                success_message: "Approver registered successfully",
            },
            JobTask::FreezeProperty(payload) => Route {
                path: FREEZE_PROPERTY_PATH,
                body: json!({ "matriculaId": payload.matricula_id, "wallet": payload.wallet }),
                success_message: "Property frozen successfully",
            },
            JobTask::UnfreezeProperty(payload) => Route {
                path: UNFREEZE_PROPERTY_PATH,
                body: json!({ "matriculaId": payload.matricula_id, "wallet": payload.wallet }),
                success_message: "Property unfrozen successfully",
            },
        }
    }

    async fn post(&self, route: Route) -> Result<JobResult, OffchainClientError> {
        let url = format!("{}{}", self.base_url, route.path);
        debug!("[Offchain API] POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&route.body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        debug!("[Offchain API] Response: {}", status);

        let text = response.text().await.map_err(|e| self.classify(e))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status.is_success() {
            Ok(parse_success(body, route.success_message))
        } else {
            error!("[Offchain API] Error {}: {}", status.as_u16(), text);
            Ok(JobResult::failure(failure_reason(&body, status)))
        }
    }

    fn classify(&self, error: reqwest::Error) -> OffchainClientError {
        if error.is_timeout() {
            OffchainClientError::Timeout(format!("{}ms", self.timeout.as_millis()))
        } else {
            OffchainClientError::Request(error)
        }
    }
}

#[async_trait]
impl JobExecutor for OffchainClient {
    async fn execute(&self, task: &JobTask) -> Result<JobResult, OffchainClientError> {
        self.post(Self::route(task)).await
    }
}

/// The registry API sometimes wraps its result in `data`, sometimes not.
fn parse_success(body: Value, success_message: &str) -> JobResult {
    let data = body.get("data").cloned().unwrap_or_else(|| body.clone());
    let string_field = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let tx_hash = string_field(&data, "txHash")
        .or_else(|| string_field(&data, "issueTxHash"))
        .or_else(|| string_field(&body, "txHash"));

    JobResult {
        success: true,
        tx_hash,
        request_hash: string_field(&data, "requestHash"),
        block_number: data.get("blockNumber").and_then(Value::as_u64),
        status: string_field(&data, "status"),
        message: Some(success_message.to_string()),
        error: None,
        data: Some(body),
    }
}

fn failure_reason(body: &Value, status: StatusCode) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()))
}
