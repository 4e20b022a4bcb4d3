//! At-least-once purchase queue.
//!
//! Admitted purchase requests are serialized as JSON and published to a
//! durable queue. Consumers receive [`Delivery`] values and acknowledge each
//! one only after its commit has finished; a delivery dropped without
//! acknowledgement is handed out again with a higher delivery count.

use super::ProviderFuture;
use crate::error::StoreError;
use crate::types::PurchaseRequest;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::sync::oneshot;

/// Stream of deliveries returned by [`DispatchQueue::subscribe`].
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, StoreError>> + Send>>;

/// One delivery of a queued message.
///
/// Calling [`ack`](Self::ack) tells the transport the message is done.
/// Dropping the delivery without acking leaves the message eligible for
/// redelivery.
#[derive(Debug)]
pub struct Delivery {
    payload: Vec<u8>,
    delivery_count: u32,
    ack: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// Create a delivery and the receiver the transport waits on.
    ///
    /// The receiver resolves to `Ok(())` on ack and to an error if the
    /// delivery is dropped unacknowledged.
    #[must_use]
    pub fn new(payload: Vec<u8>, delivery_count: u32) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                payload,
                delivery_count,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Raw message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// How many times this message has been handed out, starting at 1.
    #[must_use]
    pub const fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// Decode the body as a purchase request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the body is not a valid request.
    pub fn decode(&self) -> Result<PurchaseRequest, StoreError> {
        serde_json::from_slice(&self.payload).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Acknowledge the delivery.
    pub fn ack(mut self) {
        if let Some(tx) = self.ack.take() {
            // The transport may already have shut down; nothing to do then.
            let _ = tx.send(());
        }
    }
}

/// Encode a purchase request as a queue payload.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if encoding fails.
pub fn encode(request: &PurchaseRequest) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(request).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Durable queue of admitted purchase requests.
pub trait DispatchQueue: Send + Sync {
    /// Publish one request.
    ///
    /// # Errors
    ///
    /// Returns error if the broker rejects or cannot be reached.
    fn publish<'a>(&'a self, request: &'a PurchaseRequest) -> ProviderFuture<'a, ()>;

    /// Start consuming.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be established.
    fn subscribe(&self) -> ProviderFuture<'_, DeliveryStream>;
}

/// A message that exhausted its deliveries or could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Raw message body.
    pub payload: Vec<u8>,
    /// Decoded request, if the body was readable.
    pub request: Option<PurchaseRequest>,
    /// Why the message was dead-lettered.
    pub reason: String,
    /// Deliveries attempted.
    pub delivery_count: u32,
    /// When it was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

/// Destination for messages that will not be retried.
pub trait DeadLetterSink: Send + Sync {
    /// Record one dead letter.
    ///
    /// # Errors
    ///
    /// Returns error if the sink cannot be written.
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> ProviderFuture<'a, ()>;
}
