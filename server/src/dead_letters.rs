//! Dead-letter routing for the dispatch workers.
//!
//! Letters are recorded in the archive operators inspect. When a mirror is
//! configured (the broker's dead-letter topic) each letter is also published
//! there. The archive write decides success; a mirror failure is logged.

use flashgate_core::providers::{DeadLetter, DeadLetterSink, ProviderFuture};
use std::sync::Arc;

/// Archive-first [`DeadLetterSink`] with an optional mirror.
#[derive(Clone)]
pub struct MirroredDeadLetters {
    archive: Arc<dyn DeadLetterSink>,
    mirror: Option<Arc<dyn DeadLetterSink>>,
}

impl MirroredDeadLetters {
    /// Record into `archive` only.
    #[must_use]
    pub fn new(archive: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            archive,
            mirror: None,
        }
    }

    /// Also publish every letter to `mirror`.
    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn DeadLetterSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }
}

impl DeadLetterSink for MirroredDeadLetters {
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.archive.record(letter).await?;

            if let Some(mirror) = &self.mirror {
                if let Err(err) = mirror.record(letter).await {
                    tracing::warn!(
                        error = %err,
                        reason = %letter.reason,
                        "Dead letter archived but not mirrored"
                    );
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use chrono::Utc;
    use flashgate_testing::mocks::RecordingDeadLetterSink;

    fn letter() -> DeadLetter {
        DeadLetter {
            payload: b"garbage".to_vec(),
            request: None,
            reason: "undecodable message".into(),
            delivery_count: 1,
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_into_archive_and_mirror() {
        let archive = RecordingDeadLetterSink::new();
        let mirror = RecordingDeadLetterSink::new();
        let sink = MirroredDeadLetters::new(Arc::new(archive.clone()))
            .with_mirror(Arc::new(mirror.clone()));

        sink.record(&letter()).await.unwrap();

        assert_eq!(archive.letters().len(), 1);
        assert_eq!(mirror.letters().len(), 1);
    }

    #[tokio::test]
    async fn mirror_failure_does_not_fail_the_record() {
        let archive = RecordingDeadLetterSink::new();
        let mirror = RecordingDeadLetterSink::new();
        mirror.set_unavailable(true);
        let sink = MirroredDeadLetters::new(Arc::new(archive.clone()))
            .with_mirror(Arc::new(mirror.clone()));

        sink.record(&letter()).await.unwrap();

        assert_eq!(archive.letters().len(), 1);
    }

    #[tokio::test]
    async fn archive_failure_is_reported() {
        let archive = RecordingDeadLetterSink::new();
        archive.set_unavailable(true);
        let mirror = RecordingDeadLetterSink::new();
        let sink = MirroredDeadLetters::new(Arc::new(archive.clone()))
            .with_mirror(Arc::new(mirror.clone()));

        assert!(sink.record(&letter()).await.is_err());
        assert!(mirror.letters().is_empty());
    }
}
