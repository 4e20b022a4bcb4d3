//! Queued purchase mode: enqueue after admission, commit out-of-band, poll
//! for the outcome.
//!
//! Delivery is at-least-once. A delivery is acknowledged only after its
//! outcome is final (committed, sold out, or dead-lettered); a retryable
//! failure drops it unacknowledged so the transport hands it out again.
//! Once a message has been delivered `max_deliveries` times it is
//! dead-lettered instead of retried.

use crate::committer::OrderCommitter;
use crate::metrics::DispatchMetrics;
use flashgate_core::providers::{
    DeadLetter, DeadLetterSink, Delivery, DispatchQueue, InventoryStore, MarkerStore,
};
use flashgate_core::{
    Clock, DispatchOutcome, FlashSaleError, FlashSaleSettings, ItemId, PurchaseRequest,
    PurchaseResult, Result, UserId,
};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

/// Collaborators of the [`Dispatcher`].
#[derive(Clone)]
pub struct DispatchDeps {
    /// Purchase queue.
    pub queue: Arc<dyn DispatchQueue>,
    /// Destination of messages that will not be retried.
    pub dead_letters: Arc<dyn DeadLetterSink>,
    /// Purchase and outcome markers.
    pub markers: Arc<dyn MarkerStore>,
    /// Durable purchase rows, consulted when no marker exists.
    pub inventory: Arc<dyn InventoryStore>,
    /// Time source for dead-letter timestamps.
    pub clock: Arc<dyn Clock>,
}

/// Enqueues admitted requests and runs the worker pool.
pub struct Dispatcher {
    deps: DispatchDeps,
    committer: Arc<OrderCommitter>,
    outcome_ttl: Duration,
    max_deliveries: u32,
    workers: usize,
    queue_buffer: usize,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(deps: DispatchDeps, committer: Arc<OrderCommitter>, settings: &FlashSaleSettings) -> Self {
        Self {
            deps,
            committer,
            outcome_ttl: settings.outcome_ttl,
            max_deliveries: settings.max_deliveries.max(1),
            workers: settings.workers.max(1),
            queue_buffer: settings.queue_buffer.max(1),
        }
    }

    /// Mark the request pending and publish it.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if the marker or the queue
    /// cannot be written. The caller still holds the stock reservation.
    pub async fn enqueue(&self, request: &PurchaseRequest) -> Result<()> {
        let (user, item) = (request.user_id, request.item_id);

        // Pending goes in first so a fast worker's result is never overwritten.
        self.deps
            .markers
            .set_outcome(user, item, DispatchOutcome::Pending, self.outcome_ttl)
            .await?;

        if let Err(err) = self.deps.queue.publish(request).await {
            tracing::error!(
                request_id = %request.request_id,
                user_id = %user,
                item_id = %item,
                error = %err,
                "Failed to publish purchase request"
            );
            self.record_outcome(user, item, DispatchOutcome::Failed).await;
            return Err(err.into());
        }

        tracing::debug!(request_id = %request.request_id, user_id = %user, item_id = %item, "Purchase request queued");
        Ok(())
    }

    /// Whether a queued request for (user, item) is still waiting.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if the marker store fails.
    pub async fn is_pending(&self, user: UserId, item: ItemId) -> Result<bool> {
        Ok(matches!(
            self.deps.markers.outcome(user, item).await?,
            Some(DispatchOutcome::Pending)
        ))
    }

    /// Current result of a queued purchase.
    ///
    /// A committed purchase is reported as success regardless of the outcome
    /// marker. With no marker at all (never queued, or expired while pending)
    /// the result is `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if a store fails.
    pub async fn poll_result(&self, user: UserId, item: ItemId) -> Result<PurchaseResult> {
        if let Some(order_id) = self.deps.markers.purchase_marker(user, item).await? {
            return Ok(PurchaseResult::Success { order_id });
        }

        match self.deps.markers.outcome(user, item).await? {
            Some(DispatchOutcome::Success { order_id }) => Ok(PurchaseResult::Success { order_id }),
            Some(DispatchOutcome::Pending) => Ok(PurchaseResult::Pending),
            Some(DispatchOutcome::Failed) => Ok(PurchaseResult::Failed),
            None => Ok(match self.deps.inventory.purchase_of(user, item).await? {
                Some(order_id) => PurchaseResult::Success { order_id },
                None => PurchaseResult::Failed,
            }),
        }
    }

    /// Consume the queue with a bounded pool of workers until `shutdown`
    /// resolves or the queue closes.
    ///
    /// Deliveries already handed to the pool are finished before returning.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if the subscription cannot
    /// be established.
    pub async fn run<S>(self: Arc<Self>, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        let mut deliveries = self.deps.queue.subscribe().await?;
        let (tx, rx) = mpsc::channel::<Delivery>(self.queue_buffer);
        let rx = Arc::new(Mutex::new(rx));

        let mut pool = JoinSet::new();
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let this = Arc::clone(&self);
            pool.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(delivery) = next else { break };
                    this.process(delivery).await;
                }
                tracing::debug!(worker_id, "Dispatch worker stopped");
            });
        }
        tracing::info!(workers = self.workers, "Dispatch workers started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Dispatch shutting down");
                    break;
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        if tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "Failed to receive delivery");
                    }
                    None => {
                        tracing::info!("Dispatch queue closed");
                        break;
                    }
                },
            }
        }

        drop(tx);
        while pool.join_next().await.is_some() {}
        Ok(())
    }

    /// Handle one delivery to a final outcome, or drop it for redelivery.
    pub async fn process(&self, delivery: Delivery) {
        let count = delivery.delivery_count();
        let request = match delivery.decode() {
            Ok(request) => request,
            Err(err) => {
                DispatchMetrics::record("undecodable");
                if self
                    .dead_letter(&delivery, None, format!("undecodable payload: {err}"))
                    .await
                {
                    delivery.ack();
                }
                return;
            }
        };
        let (user, item) = (request.user_id, request.item_id);

        if count > self.max_deliveries {
            self.give_up(delivery, &request, format!("exceeded {} deliveries", self.max_deliveries))
                .await;
            return;
        }

        // A redelivery of a request that already committed.
        match self.deps.markers.purchase_marker(user, item).await {
            Ok(Some(order_id)) => {
                DispatchMetrics::record("duplicate");
                self.record_outcome(user, item, DispatchOutcome::Success { order_id })
                    .await;
                delivery.ack();
                return;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(user_id = %user, item_id = %item, error = %err, "Marker lookup failed; leaving for redelivery");
                return;
            }
        }

        match self.committer.commit(user, item).await {
            Ok(order) => {
                DispatchMetrics::record("committed");
                self.record_outcome(user, item, DispatchOutcome::Success { order_id: order.id })
                    .await;
                delivery.ack();
            }
            Err(FlashSaleError::AlreadyPurchased { order_id }) => {
                DispatchMetrics::record("duplicate");
                self.record_outcome(user, item, DispatchOutcome::Success { order_id })
                    .await;
                delivery.ack();
            }
            Err(err) if err.is_sold_out() => {
                DispatchMetrics::record("sold_out");
                self.record_outcome(user, item, DispatchOutcome::Failed).await;
                delivery.ack();
            }
            Err(err) if err.is_retryable() => {
                if count >= self.max_deliveries {
                    self.give_up(delivery, &request, err.to_string()).await;
                } else {
                    DispatchMetrics::record("retry");
                    tracing::warn!(
                        request_id = %request.request_id,
                        user_id = %user,
                        item_id = %item,
                        delivery_count = count,
                        error = %err,
                        "Commit failed, leaving for redelivery"
                    );
                }
            }
            Err(err) => {
                DispatchMetrics::record("rejected");
                if self
                    .dead_letter(&delivery, Some(&request), err.to_string())
                    .await
                {
                    self.record_outcome(user, item, DispatchOutcome::Failed).await;
                    delivery.ack();
                }
            }
        }
    }

    /// Dead-letter a request that still holds its stock reservation.
    async fn give_up(&self, delivery: Delivery, request: &PurchaseRequest, reason: String) {
        let (user, item) = (request.user_id, request.item_id);
        DispatchMetrics::record("exhausted");
        if self.dead_letter(&delivery, Some(request), reason).await {
            self.committer.abandon(user, item, "delivery_exhausted").await;
            self.record_outcome(user, item, DispatchOutcome::Failed).await;
            delivery.ack();
        }
    }

    /// Returns `true` once the letter is recorded; otherwise the delivery
    /// must not be acked.
    async fn dead_letter(
        &self,
        delivery: &Delivery,
        request: Option<&PurchaseRequest>,
        reason: String,
    ) -> bool {
        let letter = DeadLetter {
            payload: delivery.payload().to_vec(),
            request: request.cloned(),
            reason,
            delivery_count: delivery.delivery_count(),
            failed_at: self.deps.clock.now(),
        };

        match self.deps.dead_letters.record(&letter).await {
            Ok(()) => {
                DispatchMetrics::record_dead_letter();
                tracing::warn!(
                    request_id = ?letter.request.as_ref().map(|r| r.request_id),
                    user_id = ?letter.request.as_ref().map(|r| r.user_id.0),
                    item_id = ?letter.request.as_ref().map(|r| r.item_id.0),
                    delivery_count = letter.delivery_count,
                    reason = %letter.reason,
                    "Purchase message dead-lettered"
                );
                true
            }
            Err(err) => {
                tracing::error!(
                    delivery_count = letter.delivery_count,
                    reason = %letter.reason,
                    error = %err,
                    "Failed to record dead letter; leaving for redelivery"
                );
                false
            }
        }
    }

    async fn record_outcome(&self, user: UserId, item: ItemId, outcome: DispatchOutcome) {
        if let Err(err) = self
            .deps
            .markers
            .set_outcome(user, item, outcome, self.outcome_ttl)
            .await
        {
            tracing::warn!(user_id = %user, item_id = %item, ?outcome, error = %err, "Failed to record dispatch outcome");
        }
    }
}
