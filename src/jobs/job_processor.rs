//! Retry/delivery state machine for a single job.
//!
//! Drives executor attempts for one job until it succeeds or exhausts its
//! attempt budget, sleeping with capped exponential backoff between
//! attempts. Only the task handling this delivery is suspended; other
//! deliveries keep running.
use std::sync::Arc;

use log::error;
use tokio::time::sleep;

use crate::{
    jobs::{BackoffRetryPolicy, Job, WorkerStats},
    logging::{log_job_event, JobEvent},
    models::JobResult,
    services::JobExecutor,
};

pub struct JobProcessor {
    executor: Arc<dyn JobExecutor>,
    stats: Arc<WorkerStats>,
    policy: BackoffRetryPolicy,
}

impl JobProcessor {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        stats: Arc<WorkerStats>,
        policy: BackoffRetryPolicy,
    ) -> Self {
        Self {
            executor,
            stats,
            policy,
        }
    }

    /// Runs the job to a terminal result. Never panics past this boundary and
    /// always returns: a failing executor is called at most `maxAttempts` times.
    ///
    /// A failed terminal result always carries an error string.
    pub async fn process(&self, job: &Job) -> JobResult {
        let task = match job.task() {
            Ok(task) => task,
            Err(e) => {
                // deterministic, retrying cannot help
                self.stats.record_failure();
                log_job_event(&job.id, &job.job_type, JobEvent::Failed, &e.to_string());
                return JobResult::failure(e.to_string());
            }
        };

        let max_attempts = job.max_attempts_or(self.policy.default_max_attempts);
        let mut attempts = job.attempts;

        loop {
            log_job_event(
                &job.id,
                &job.job_type,
                JobEvent::Started,
                &format!("Attempt {}", attempts + 1),
            );

            let error_message = match self.executor.execute(&task).await {
                Ok(result) if result.success => {
                    self.stats.record_success();
                    log_job_event(
                        &job.id,
                        &job.job_type,
                        JobEvent::Completed,
                        &format!("TX: {}", result.tx_hash.as_deref().unwrap_or("none")),
                    );
                    return result;
                }
                Ok(result) => result.error_message(),
                Err(e) => e.to_string(),
            };

            error!("Job {} failed: {}", job.id, error_message);

            let current_attempt = attempts.saturating_add(1);
            if current_attempt >= max_attempts {
                self.stats.record_failure();
                log_job_event(
                    &job.id,
                    &job.job_type,
                    JobEvent::Failed,
                    &format!("Max retries ({}) exceeded", max_attempts),
                );
                return JobResult::failure(error_message);
            }

            self.stats.record_retry();
            let delay = self.policy.backoff_duration(current_attempt);
            log_job_event(
                &job.id,
                &job.job_type,
                JobEvent::Retry,
                &format!("Will retry in {}ms", delay.as_millis()),
            );
            sleep(delay).await;
            attempts = current_attempt;
        }
    }
}
