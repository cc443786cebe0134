use thiserror::Error;

/// Errors raised at the broker seam.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Channel not initialized. Call connect() first.")]
    ChannelNotInitialized,

    #[error("Acknowledgement error: {0}")]
    Acknowledgement(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
