//! Turns one broker delivery into exactly one acknowledgement decision.
//!
//! | Outcome                         | Decision            | Side effects              |
//! |---------------------------------|---------------------|---------------------------|
//! | body is not a job envelope      | reject, requeue     | none                      |
//! | job succeeded                   | ack                 | orchestrator notification |
//! | job failed terminally           | reject, no requeue  | dead-letter publish       |
use std::sync::Arc;

use log::{error, info, warn};

use super::{AckDecision, BrokerSession, DeadLetterJob, Delivery};
use crate::{
    jobs::{Job, JobProcessor},
    models::{produce_blockchain_update_payload, JobResult},
    services::{notify_in_background, NotificationSender},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    /// `published` is false when the dead-letter copy could not be written.
    DeadLettered { published: bool },
    Requeued,
}

pub struct DeliveryHandler {
    processor: Arc<JobProcessor>,
    notifier: Option<Arc<dyn NotificationSender>>,
    dead_letter_queue: String,
}

impl DeliveryHandler {
    pub fn new(
        processor: Arc<JobProcessor>,
        notifier: Option<Arc<dyn NotificationSender>>,
        dead_letter_queue: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            notifier,
            dead_letter_queue: dead_letter_queue.into(),
        }
    }

    pub async fn handle(&self, delivery: Delivery, session: &dyn BrokerSession) -> DeliveryOutcome {
        let job: Job = match serde_json::from_slice(&delivery.data) {
            Ok(job) => job,
            Err(e) => {
                error!(
                    "Error processing message {}: {}",
                    delivery.delivery_tag, e
                );
                settle(delivery, AckDecision::Reject { requeue: true }).await;
                return DeliveryOutcome::Requeued;
            }
        };

        info!("Received job: {} ({})", job.id, job.job_type);
        let result = self.processor.process(&job).await;

        if result.success {
            settle(delivery, AckDecision::Ack).await;
            info!("Job {} completed and acknowledged", job.id);
            self.notify(&job, &result);
            return DeliveryOutcome::Acked;
        }

        let reason = result.error_message();
        settle(delivery, AckDecision::Reject { requeue: false }).await;
        warn!("Job {} failed, sent to dead letter queue", job.id);

        let published = self.publish_dead_letter(session, job, reason).await;
        DeliveryOutcome::DeadLettered { published }
    }

    fn notify(&self, job: &Job, result: &JobResult) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let target = job.task().ok().and_then(|task| task.notification_target());
        let payload = produce_blockchain_update_payload(&job.id, result);
        if let (Some(target), Some(payload)) = (target, payload) {
            notify_in_background(Arc::clone(notifier), target, payload);
        }
    }

    async fn publish_dead_letter(&self, session: &dyn BrokerSession, job: Job, reason: String) -> bool {
        let job_id = job.id.clone();
        let published = match DeadLetterJob::new(job, reason).to_bytes() {
            Ok(bytes) => session
                .publish_persistent(&self.dead_letter_queue, &bytes)
                .await,
            Err(e) => Err(e),
        };
        match published {
            Ok(()) => {
                info!("Job {} sent to DLQ: {}", job_id, self.dead_letter_queue);
                true
            }
            Err(e) => {
                error!("Failed to send job {} to DLQ: {}", job_id, e);
                false
            }
        }
    }
}

/// The broker redelivers on its own if this fails, so there is nothing to retry.
async fn settle(delivery: Delivery, decision: AckDecision) {
    let tag = delivery.delivery_tag;
    if let Err(e) = delivery.settle(decision).await {
        error!("Failed to settle delivery {} ({:?}): {}", tag, decision, e);
    }
}
