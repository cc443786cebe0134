//! This module provides the `OrchestratorWebhook` for reporting settled
//! transactions back to the orchestration service.
//!
//! Delivery is best-effort: callers spawn it with [`notify_in_background`] and
//! a failure is logged, never propagated to the job's outcome.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;

#[cfg(test)]
use mockall::automock;

use crate::{
    constants::{WEBHOOK_API_KEY_HEADER, WEBHOOK_TIMEOUT_MS},
    models::{NotificationTarget, SecretString, WebhookUpdatePayload},
};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Webhook rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait NotificationSender: Send + Sync {
    async fn send_update(
        &self,
        target: NotificationTarget,
        payload: WebhookUpdatePayload,
    ) -> Result<(), WebhookError>;
}

#[derive(Debug, Clone)]
pub struct OrchestratorWebhook {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl OrchestratorWebhook {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(WEBHOOK_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, target: NotificationTarget) -> String {
        format!("{}/api/webhooks/blockchain/{}", self.base_url, target)
    }
}

#[async_trait]
impl NotificationSender for OrchestratorWebhook {
    async fn send_update(
        &self,
        target: NotificationTarget,
        payload: WebhookUpdatePayload,
    ) -> Result<(), WebhookError> {
        let url = self.url(target);
        info!(
            "Sending {} webhook to orchestrator: url={}, txHash={}, jobId={}",
            target.kind(),
            url,
            payload.transaction_hash,
            payload.job_id
        );

        let api_key = self.api_key.to_str();
        let response = self
            .client
            .patch(&url)
            .header(WEBHOOK_API_KEY_HEADER, api_key.as_str())
            .json(&payload)
            .send()
            .await?;

        if response.status().is_success() {
            info!("Webhook sent successfully: {}", target);
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(WebhookError::Rejected { status, body })
        }
    }
}

/// Spawns the webhook call as a detached task. The handle is only useful to
/// tests; the job's acknowledgement never waits on it.
pub fn notify_in_background(
    sender: Arc<dyn NotificationSender>,
    target: NotificationTarget,
    payload: WebhookUpdatePayload,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let job_id = payload.job_id.clone();
        if let Err(e) = sender.send_update(target, payload).await {
            error!("Webhook failed for job {} ({}): {}", job_id, target, e);
        }
    })
}
