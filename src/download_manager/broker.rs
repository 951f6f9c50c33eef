//! Durable job queue access.
//!
//! The worker talks to the broker through [`JobBroker`] and [`BrokerSession`];
//! [`AmqpBroker`] is the RabbitMQ implementation.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info};

use crate::config::BrokerSettings;

/// Persistent delivery mode for published messages.
const PERSISTENT: u8 = 2;
const JSON_CONTENT_TYPE: &str = "application/json";

/// Queues the worker consumes from and publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub work_queue: String,
    pub dead_letter_queue: String,
    /// Unacknowledged deliveries the broker may push at once
    pub prefetch: u16,
}

impl QueueTopology {
    pub fn from_settings(settings: &BrokerSettings) -> Self {
        Self {
            work_queue: settings.queue.clone(),
            dead_letter_queue: settings.dead_letter_queue(),
            prefetch: settings.prefetch,
        }
    }
}

/// One message handed to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("consumer stream closed by the broker")]
    StreamClosed,

    #[error("broker error: {0}")]
    Other(String),
}

/// Factory for broker sessions; called again after every disconnect.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Opens a channel, applies the prefetch limit, declares both durable
    /// queues and starts consuming the work queue.
    async fn connect(&self, topology: &QueueTopology) -> Result<Box<dyn BrokerSession>, BrokerError>;
}

/// A live channel with an active consumer.
#[async_trait]
pub trait BrokerSession: Send {
    /// Waits for the next delivery. Errors mean the session is unusable.
    async fn next_delivery(&mut self) -> Result<Delivery, BrokerError>;

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError>;

    /// Returns the message to the queue for redelivery.
    async fn nack_requeue(&mut self, tag: u64) -> Result<(), BrokerError>;

    /// Publishes a persistent message to `queue` through the default exchange.
    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), BrokerError>;

    async fn close(&mut self);
}

/// RabbitMQ broker reached over AMQP 0-9-1.
pub struct AmqpBroker {
    url: String,
    consumer_tag: String,
}

impl AmqpBroker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            consumer_tag: format!("song-worker-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    async fn open_channel(
        &self,
        topology: &QueueTopology,
    ) -> Result<(Connection, Channel), BrokerError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(topology.prefetch, BasicQosOptions::default())
            .await?;

        for queue in [&topology.work_queue, &topology.dead_letter_queue] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
        Ok((connection, channel))
    }

    /// Publishes already-encoded jobs to the work queue and disconnects.
    ///
    /// Used by producers; does not start a consumer.
    pub async fn publish_all(
        &self,
        topology: &QueueTopology,
        bodies: &[Vec<u8>],
    ) -> Result<usize, BrokerError> {
        let (connection, channel) = self.open_channel(topology).await?;
        for body in bodies {
            publish_persistent(&channel, &topology.work_queue, body).await?;
        }
        info!(
            "Published {} jobs to {}",
            bodies.len(),
            topology.work_queue
        );
        close_quietly(&connection, &channel).await;
        Ok(bodies.len())
    }
}

async fn publish_persistent(channel: &Channel, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
    channel
        .basic_publish(
            "",
            queue,
            BasicPublishOptions::default(),
            body,
            BasicProperties::default()
                .with_delivery_mode(PERSISTENT)
                .with_content_type(JSON_CONTENT_TYPE.into()),
        )
        .await?
        .await?;
    Ok(())
}

async fn close_quietly(connection: &Connection, channel: &Channel) {
    if let Err(e) = channel.close(200, "bye").await {
        debug!("Channel close failed: {}", e);
    }
    if let Err(e) = connection.close(200, "bye").await {
        debug!("Connection close failed: {}", e);
    }
}

#[async_trait]
impl JobBroker for AmqpBroker {
    async fn connect(&self, topology: &QueueTopology) -> Result<Box<dyn BrokerSession>, BrokerError> {
        let (connection, channel) = self.open_channel(topology).await?;
        let consumer = channel
            .basic_consume(
                &topology.work_queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            "Consuming {} (prefetch={}, dead letters to {})",
            topology.work_queue, topology.prefetch, topology.dead_letter_queue
        );
        Ok(Box::new(AmqpSession {
            connection,
            channel,
            consumer,
        }))
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn next_delivery(&mut self) -> Result<Delivery, BrokerError> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Delivery {
                tag: delivery.delivery_tag,
                body: delivery.data,
                redelivered: delivery.redelivered,
            }),
            Some(Err(e)) => Err(e.into()),
            None => Err(BrokerError::StreamClosed),
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack_requeue(&mut self, tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                tag,
                BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        publish_persistent(&self.channel, queue, body).await
    }

    async fn close(&mut self) {
        close_quietly(&self.connection, &self.channel).await;
    }
}
