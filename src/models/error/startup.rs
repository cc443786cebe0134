use thiserror::Error;

use super::QueueError;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Failed to establish RabbitMQ connection after {0} seconds")]
    BrokerNotReady(u64),

    #[error("Failed to start consuming: {0}")]
    Consume(#[from] QueueError),
}
