//! RabbitMQ session over lapin.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use log::{error, warn};
use tokio::{sync::watch, time::sleep};

use super::{BrokerConnector, BrokerSession, Delivery, DeliveryAcknowledger, DeliveryStream};
use crate::models::QueueError;

/// AMQP `delivery_mode` for messages that survive a broker restart.
const PERSISTENT_DELIVERY_MODE: u8 = 2;
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct AmqpConnector {
    url: String,
}

impl AmqpConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>, QueueError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        let (closed_tx, _) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);

        let on_connection_error = Arc::clone(&closed_tx);
        connection.on_error(move |err| {
            error!("RabbitMQ connection error: {}", err);
            on_connection_error.send_replace(true);
        });
        let on_channel_error = Arc::clone(&closed_tx);
        channel.on_error(move |err| {
            error!("RabbitMQ channel error: {}", err);
            on_channel_error.send_replace(true);
        });

        Ok(Arc::new(AmqpSession {
            connection,
            channel,
            closed_tx,
        }))
    }
}

pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    closed_tx: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn set_prefetch(&self, prefetch_count: u16) -> Result<(), QueueError> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn declare_durable_queue(&self, name: &str) -> Result<(), QueueError> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, QueueError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer
            .map(|item| {
                item.map(|delivery| {
                    Delivery::new(
                        delivery.delivery_tag,
                        delivery.redelivered,
                        delivery.data,
                        Box::new(AmqpAcker(delivery.acker)),
                    )
                })
                .map_err(QueueError::from)
            })
            .boxed())
    }

    async fn publish_persistent(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_content_type("application/json".into()),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn closed(&self) {
        let mut closed_rx = self.closed_tx.subscribe();
        loop {
            if *closed_rx.borrow_and_update() || !self.is_open() {
                return;
            }
            // a broker-initiated close does not always reach on_error
            tokio::select! {
                changed = closed_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = sleep(STATUS_POLL_INTERVAL) => {}
            }
        }
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(&self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "Bye").await {
                warn!("Error closing RabbitMQ channel: {}", e);
            }
        }
        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "Bye").await {
                warn!("Error closing RabbitMQ connection: {}", e);
            }
        }
        self.closed_tx.send_replace(true);
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl DeliveryAcknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::Acknowledgement(e.to_string()))
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.0
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(|e| QueueError::Acknowledgement(e.to_string()))
    }
}
