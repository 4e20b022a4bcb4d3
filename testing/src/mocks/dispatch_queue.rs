//! In-memory at-least-once queue and dead-letter recorder.

use super::guard;
use chrono::Utc;
use flashgate_core::providers::{
    DeadLetter, DeadLetterArchive, DeadLetterEntry, DeadLetterSink, DeadLetterStatus, Delivery,
    DeliveryStream, DispatchQueue, ProviderFuture, encode,
};
use flashgate_core::{PurchaseRequest, StoreError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Message = (Vec<u8>, u32);

/// In-memory [`DispatchQueue`].
///
/// A delivery dropped without ack is put back on the queue with its delivery
/// count incremented. Only one subscriber is supported.
#[derive(Debug, Clone)]
pub struct InMemoryDispatchQueue {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<Message>>>>,
    published: Arc<AtomicUsize>,
    acked: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryDispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDispatchQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            published: Arc::new(AtomicUsize::new(0)),
            acked: Arc::new(AtomicUsize::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Push a raw payload, bypassing encoding.
    pub fn publish_raw(&self, payload: Vec<u8>) {
        self.published.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send((payload, 1));
    }

    /// Make `publish` fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Messages published so far.
    #[must_use]
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Deliveries acknowledged so far.
    #[must_use]
    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

impl DispatchQueue for InMemoryDispatchQueue {
    fn publish<'a>(&'a self, request: &'a PurchaseRequest) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("queue offline".into()));
            }
            let payload = encode(request)?;
            self.published.fetch_add(1, Ordering::SeqCst);
            self.sender
                .send((payload, 1))
                .map_err(|e| StoreError::Unavailable(e.to_string()))
        })
    }

    fn subscribe(&self) -> ProviderFuture<'_, DeliveryStream> {
        Box::pin(async move {
            let mut receiver = guard(&self.receiver)?
                .take()
                .ok_or_else(|| StoreError::Unavailable("queue already has a subscriber".into()))?;
            let requeue = self.sender.clone();
            let acked = Arc::clone(&self.acked);

            let stream = async_stream::stream! {
                while let Some((payload, count)) = receiver.recv().await {
                    let (delivery, ack) = Delivery::new(payload.clone(), count);
                    let requeue = requeue.clone();
                    let acked = Arc::clone(&acked);
                    tokio::spawn(async move {
                        if ack.await.is_ok() {
                            acked.fetch_add(1, Ordering::SeqCst);
                        } else {
                            let _ = requeue.send((payload, count + 1));
                        }
                    });
                    yield Ok(delivery);
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

/// [`DeadLetterArchive`] that keeps every letter in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingDeadLetterSink {
    entries: Arc<Mutex<Vec<DeadLetterEntry>>>,
    unavailable: Arc<AtomicBool>,
}

impl RecordingDeadLetterSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Letters recorded so far, in order.
    #[must_use]
    pub fn letters(&self) -> Vec<DeadLetter> {
        guard(&self.entries)
            .map(|entries| entries.iter().map(|e| e.letter.clone()).collect())
            .unwrap_or_default()
    }

    /// Make `record` fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl DeadLetterSink for RecordingDeadLetterSink {
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("dead-letter sink offline".into()));
            }
            let mut entries = guard(&self.entries)?;
            let id = i64::try_from(entries.len()).unwrap_or(i64::MAX - 1) + 1;
            entries.push(DeadLetterEntry {
                id,
                letter: letter.clone(),
                status: DeadLetterStatus::Pending,
                closed_at: None,
                closed_by: None,
                notes: None,
            });
            Ok(())
        })
    }
}

impl DeadLetterArchive for RecordingDeadLetterSink {
    fn list(&self, status: DeadLetterStatus, limit: usize) -> ProviderFuture<'_, Vec<DeadLetterEntry>> {
        Box::pin(async move {
            Ok(guard(&self.entries)?
                .iter()
                .filter(|e| e.status == status)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn entry(&self, id: i64) -> ProviderFuture<'_, Option<DeadLetterEntry>> {
        Box::pin(async move { Ok(guard(&self.entries)?.iter().find(|e| e.id == id).cloned()) })
    }

    fn close<'a>(
        &'a self,
        id: i64,
        status: DeadLetterStatus,
        closed_by: &'a str,
        notes: Option<&'a str>,
    ) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            let mut entries = guard(&self.entries)?;
            let Some(entry) = entries
                .iter_mut()
                .find(|e| e.id == id && e.status == DeadLetterStatus::Pending)
            else {
                return Ok(false);
            };
            entry.status = status;
            entry.closed_at = Some(Utc::now());
            entry.closed_by = Some(closed_by.to_string());
            entry.notes = notes.map(str::to_string);
            Ok(true)
        })
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod archive_tests {
    use super::*;

    fn letter(reason: &str) -> DeadLetter {
        DeadLetter {
            payload: b"{}".to_vec(),
            request: None,
            reason: reason.into(),
            delivery_count: 1,
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn closing_moves_an_entry_out_of_pending() {
        let sink = RecordingDeadLetterSink::new();
        sink.record(&letter("a")).await.unwrap();
        sink.record(&letter("b")).await.unwrap();

        assert!(sink.close(1, DeadLetterStatus::Discarded, "ops", None).await.unwrap());
        assert!(!sink.close(1, DeadLetterStatus::Resolved, "ops", None).await.unwrap());

        let pending = sink.list(DeadLetterStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].letter.reason, "b");
        assert_eq!(sink.letters().len(), 2);
    }
}
