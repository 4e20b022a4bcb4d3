//! Redpanda purchase queue for Flashgate.
//!
//! Implements the [`DispatchQueue`] provider on a Kafka-compatible topic
//! with rdkafka, plus a [`DeadLetterSink`](flashgate_core::providers::DeadLetterSink)
//! that mirrors dead letters onto a second topic.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - An offset is committed only once its [`Delivery`] has been acknowledged
//!   and every lower offset of the partition has finished
//! - A delivery dropped without ack is re-published with its
//!   `delivery-count` header incremented, then its offset is released
//! - If the process crashes before commit, messages will be redelivered
//! - Consumers MUST be idempotent; the dispatcher checks the purchase marker
//!
//! Messages are keyed by user id, so one buyer's requests stay ordered
//! within a partition.
//!
//! # Example
//!
//! ```no_run
//! use flashgate_redpanda::RedpandaDispatchQueue;
//!
//! # fn example() -> Result<(), flashgate_core::StoreError> {
//! let queue = RedpandaDispatchQueue::builder()
//!     .brokers("localhost:9092")
//!     .topic("flashsale-purchases")
//!     .consumer_group("flashgate-dispatch")
//!     .build()?;
//! let dead_letters = queue.dead_letter_topic("flashsale-purchases-dlq");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dead_letter_topic;
mod offsets;

pub use dead_letter_topic::RedpandaDeadLetterTopic;

use flashgate_core::providers::{Delivery, DeliveryStream, DispatchQueue, ProviderFuture, encode};
use flashgate_core::{PurchaseRequest, StoreError};
use offsets::OffsetTracker;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tokio::sync::mpsc;

/// Header carrying how many times a message has been handed out.
pub const DELIVERY_COUNT_HEADER: &str = "delivery-count";

/// Default purchase topic.
pub const DEFAULT_TOPIC: &str = "flashsale-purchases";

/// Default consumer group shared by every dispatcher instance.
pub const DEFAULT_CONSUMER_GROUP: &str = "flashgate-dispatch";

/// Redpanda-backed [`DispatchQueue`].
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Topic**: Purchase topic (default: `flashsale-purchases`)
/// - **Consumer group**: Shared by all dispatcher instances (default: `flashgate-dispatch`)
/// - **Producer settings**: Acks (default: `all`), compression, timeout
/// - **Buffer size**: Deliveries buffered ahead of the workers (default: 1000)
/// - **Offset reset**: Where a new group starts reading (default: `earliest`)
pub struct RedpandaDispatchQueue {
    /// Kafka producer for publishing purchase requests
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Purchase topic
    topic: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID
    consumer_group: String,
    /// Delivery buffer size for the subscriber
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaDispatchQueue {
    /// Create a queue with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, StoreError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the queue.
    #[must_use]
    pub fn builder() -> RedpandaDispatchQueueBuilder {
        RedpandaDispatchQueueBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Purchase topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// A dead-letter sink on `topic` that shares this queue's producer.
    #[must_use]
    pub fn dead_letter_topic(&self, topic: impl Into<String>) -> RedpandaDeadLetterTopic {
        RedpandaDeadLetterTopic {
            producer: self.producer.clone(),
            topic: topic.into(),
            timeout: self.timeout,
        }
    }
}

/// Builder for configuring a [`RedpandaDispatchQueue`].
#[derive(Default)]
pub struct RedpandaDispatchQueueBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaDispatchQueueBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the purchase topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID.
    ///
    /// Every dispatcher instance should share one group so that each
    /// purchase request is handled by exactly one of them at a time.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many deliveries are buffered ahead of the worker pool.
    ///
    /// Zero is treated as one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set the auto offset reset policy for new consumer groups.
    ///
    /// Default: "earliest", so requests published before the first
    /// dispatcher joined are not skipped.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaDispatchQueue`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if brokers are not set or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaDispatchQueue, StoreError> {
        let brokers = self
            .brokers
            .ok_or_else(|| StoreError::Unavailable("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create producer: {e}")))?;

        let queue = RedpandaDispatchQueue {
            producer,
            brokers,
            topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self
                .consumer_group
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            buffer_size: self.buffer_size.unwrap_or(1000),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
        };

        tracing::info!(
            brokers = %queue.brokers,
            topic = %queue.topic,
            acks,
            compression,
            consumer_group = %queue.consumer_group,
            buffer_size = queue.buffer_size,
            "RedpandaDispatchQueue created successfully"
        );

        Ok(queue)
    }
}

/// A finished delivery reported back to the consumer task.
struct Completion {
    partition: i32,
    offset: i64,
    acked: bool,
    payload: Vec<u8>,
    key: Vec<u8>,
    delivery_count: u32,
}

/// Read the delivery count header; a message without one is on its first
/// delivery.
fn delivery_count_of<M: Message>(message: &M) -> u32 {
    message
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|h| h.key == DELIVERY_COUNT_HEADER)
                .and_then(|h| h.value)
                .and_then(|v| std::str::from_utf8(v).ok())
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or(1)
}

fn delivery_headers(delivery_count: u32) -> OwnedHeaders {
    let count = delivery_count.to_string();
    OwnedHeaders::new().insert(Header {
        key: DELIVERY_COUNT_HEADER,
        value: Some(count.as_str()),
    })
}

async fn send(
    producer: &FutureProducer,
    topic: &str,
    key: &[u8],
    payload: &[u8],
    delivery_count: u32,
    timeout: Duration,
) -> Result<(i32, i64), StoreError> {
    let record = FutureRecord::to(topic)
        .payload(payload)
        .key(key)
        .headers(delivery_headers(delivery_count));

    producer
        .send(record, Timeout::After(timeout))
        .await
        .map_err(|(kafka_error, _)| {
            StoreError::Unavailable(format!("Failed to publish to {topic}: {kafka_error}"))
        })
}

impl DispatchQueue for RedpandaDispatchQueue {
    fn publish<'a>(&'a self, request: &'a PurchaseRequest) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let payload = encode(request)?;
            let key = request.user_id.to_string();

            let (partition, offset) = send(
                &self.producer,
                &self.topic,
                key.as_bytes(),
                &payload,
                1,
                self.timeout,
            )
            .await
            .inspect_err(|e| {
                tracing::error!(
                    topic = %self.topic,
                    request_id = %request.request_id,
                    error = %e,
                    "Failed to publish purchase request"
                );
            })?;

            tracing::debug!(
                topic = %self.topic,
                partition,
                offset,
                request_id = %request.request_id,
                "Purchase request published"
            );
            Ok(())
        })
    }

    #[allow(clippy::too_many_lines)] // Complexity required for at-least-once delivery with manual commits
    fn subscribe(&self) -> ProviderFuture<'_, DeliveryStream> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            // Manual commit for at-least-once delivery
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &self.consumer_group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| StoreError::Unavailable(format!("Failed to create consumer: {e}")))?;

            consumer.subscribe(&[topic.as_str()]).map_err(|e| {
                StoreError::Unavailable(format!("Failed to subscribe to {topic}: {e}"))
            })?;

            tracing::info!(
                topic = %topic,
                consumer_group = %self.consumer_group,
                buffer_size = self.buffer_size,
                auto_offset_reset = %self.auto_offset_reset,
                manual_commit = true,
                "Subscribed to purchase topic"
            );

            let (tx, rx) = mpsc::channel(self.buffer_size);

            // Spawn a task that owns the consumer, forwards deliveries and
            // commits offsets as acknowledgements come back.
            tokio::spawn(async move {
                use futures::StreamExt;

                let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
                let mut offsets = OffsetTracker::default();
                let mut stream = consumer.stream();

                loop {
                    tokio::select! {
                        Some(done) = done_rx.recv() => {
                            if !done.acked {
                                let next = done.delivery_count.saturating_add(1);
                                if let Err(e) = send(&producer, &topic, &done.key, &done.payload, next, timeout).await {
                                    // Offset stays in flight; the message comes back after a restart.
                                    tracing::error!(
                                        partition = done.partition,
                                        offset = done.offset,
                                        error = %e,
                                        "Failed to requeue unacknowledged delivery"
                                    );
                                    continue;
                                }
                                tracing::debug!(
                                    partition = done.partition,
                                    offset = done.offset,
                                    delivery_count = next,
                                    "Unacknowledged delivery requeued"
                                );
                            }

                            let Some(position) = offsets.complete(done.partition, done.offset) else {
                                continue;
                            };
                            let mut commit = TopicPartitionList::new();
                            if let Err(e) = commit.add_partition_offset(&topic, done.partition, Offset::Offset(position)) {
                                tracing::warn!(error = %e, "Failed to build commit list");
                                continue;
                            }
                            if let Err(e) = consumer.commit(&commit, CommitMode::Async) {
                                tracing::warn!(
                                    partition = done.partition,
                                    offset = position,
                                    error = %e,
                                    "Failed to commit offset (message may be redelivered)"
                                );
                            }
                        }
                        next = stream.next() => {
                            let message = match next {
                                Some(Ok(message)) => message,
                                Some(Err(e)) => {
                                    let err = StoreError::Unavailable(format!("Failed to receive message: {e}"));
                                    if tx.send(Err(err)).await.is_err() {
                                        break;
                                    }
                                    continue;
                                }
                                None => break,
                            };

                            let partition = message.partition();
                            let offset = message.offset();
                            let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                            let key = message.key().map(<[u8]>::to_vec).unwrap_or_default();
                            let delivery_count = delivery_count_of(&message);
                            drop(message);

                            tracing::trace!(partition, offset, delivery_count, "Received purchase message");

                            offsets.start(partition, offset);
                            let (delivery, acked) = Delivery::new(payload.clone(), delivery_count);
                            let done_tx = done_tx.clone();
                            tokio::spawn(async move {
                                let acked = acked.await.is_ok();
                                let _ = done_tx.send(Completion {
                                    partition,
                                    offset,
                                    acked,
                                    payload,
                                    key,
                                    delivery_count,
                                });
                            });

                            // Receiver dropped: exit WITHOUT committing
                            if tx.send(Ok(delivery)).await.is_err() {
                                tracing::debug!("Delivery receiver dropped, exiting consumer task");
                                break;
                            }
                        }
                    }
                }

                offsets.clear();
                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}
