//! Dead letters mirrored onto a Kafka topic.

use flashgate_core::StoreError;
use flashgate_core::providers::{DeadLetter, DeadLetterSink, ProviderFuture};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

/// [`DeadLetterSink`] that publishes each letter as JSON.
///
/// Created with [`RedpandaDispatchQueue::dead_letter_topic`](crate::RedpandaDispatchQueue::dead_letter_topic)
/// so it shares the queue's producer.
#[derive(Clone)]
pub struct RedpandaDeadLetterTopic {
    pub(crate) producer: FutureProducer,
    pub(crate) topic: String,
    pub(crate) timeout: Duration,
}

impl RedpandaDeadLetterTopic {
    /// Topic the letters are written to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl DeadLetterSink for RedpandaDeadLetterTopic {
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let payload =
                serde_json::to_vec(letter).map_err(|e| StoreError::Serialization(e.to_string()))?;
            let key = letter
                .request
                .as_ref()
                .map(|r| r.user_id.to_string())
                .unwrap_or_default();

            let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);
            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %self.topic,
                        partition,
                        offset,
                        "Dead letter published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => Err(StoreError::Unavailable(format!(
                    "Failed to publish dead letter: {kafka_error}"
                ))),
            }
        })
    }
}
