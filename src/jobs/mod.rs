/// This module defines the job envelope and the typed tasks it decodes into.
mod job;
pub use job::*;

/// This module implements the capped exponential backoff used between attempts.
mod retry_backoff;
pub use retry_backoff::*;

/// This module drives a job through its retry sequence.
mod job_processor;
pub use job_processor::*;

/// This module holds the process-wide job counters.
mod worker_stats;
pub use worker_stats::*;
