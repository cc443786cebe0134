use thiserror::Error;

/// Raised when a structurally valid job cannot be turned into a typed task.
///
/// These failures are deterministic, so the retry engine treats them as
/// terminal on the first attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobValidationError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Invalid payload for {job_type}: {reason}")]
    InvalidPayload { job_type: String, reason: String },
}
