//! Application state initialization
//!
//! Wires the executor, notifier, statistics, retry engine and queue consumer
//! into one [`AppState`]. Nothing here touches the network; connecting is
//! left to [`super::initialize_workers`].
use std::sync::Arc;

use color_eyre::{eyre::WrapErr, Result};

use crate::{
    config::WorkerConfig,
    jobs::{JobProcessor, WorkerStats},
    queue::{AmqpConnector, BrokerConnector, DeliveryHandler, QueueConsumer},
    services::{JobExecutor, NotificationSender, OffchainClient, OrchestratorWebhook},
};

pub struct AppState {
    pub config: Arc<WorkerConfig>,
    pub stats: Arc<WorkerStats>,
    pub consumer: Arc<QueueConsumer>,
}

/// Builds the production graph: RabbitMQ over lapin, the offchain HTTP API,
/// and the orchestrator webhook.
pub fn initialize_app_state(config: Arc<WorkerConfig>) -> Result<AppState> {
    let executor = OffchainClient::new(&config.offchain_api_url, config.offchain_api_timeout)
        .wrap_err("Failed to build offchain API client")?;
    let notifier = OrchestratorWebhook::new(&config.orchestrator_url, config.webhook_api_key.clone())
        .wrap_err("Failed to build orchestrator webhook client")?;
    let connector = AmqpConnector::new(&config.rabbitmq_url);

    Ok(assemble_app_state(
        config,
        Arc::new(connector),
        Arc::new(executor),
        Some(Arc::new(notifier)),
    ))
}

/// Builds the graph around caller-supplied collaborators.
pub fn assemble_app_state(
    config: Arc<WorkerConfig>,
    connector: Arc<dyn BrokerConnector>,
    executor: Arc<dyn JobExecutor>,
    notifier: Option<Arc<dyn NotificationSender>>,
) -> AppState {
    let stats = Arc::new(WorkerStats::new());
    let processor = Arc::new(JobProcessor::new(
        executor,
        Arc::clone(&stats),
        config.retry_policy(),
    ));
    let handler = Arc::new(DeliveryHandler::new(
        processor,
        notifier,
        config.dead_letter_queue.clone(),
    ));
    let consumer = QueueConsumer::new(connector, handler, config.queue_settings());

    AppState {
        config,
        stats,
        consumer,
    }
}
