//! Operator-facing storage of dead-lettered purchase messages.

use super::ProviderFuture;
use super::dispatch_queue::{DeadLetter, DeadLetterSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Triage state of a dead letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterStatus {
    /// Waiting for an operator.
    Pending,
    /// Handled; the purchase was reconciled by hand.
    Resolved,
    /// Dropped; nothing to reconcile.
    Discarded,
}

impl DeadLetterStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }
}

/// A stored dead letter and its triage metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Archive id.
    pub id: i64,
    /// The letter as recorded.
    #[serde(flatten)]
    pub letter: DeadLetter,
    /// Current triage state.
    pub status: DeadLetterStatus,
    /// When the entry left `Pending`.
    pub closed_at: Option<DateTime<Utc>>,
    /// Operator that closed it.
    pub closed_by: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// A [`DeadLetterSink`] that keeps letters for inspection.
pub trait DeadLetterArchive: DeadLetterSink {
    /// Entries with `status`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the archive cannot be read.
    fn list(&self, status: DeadLetterStatus, limit: usize) -> ProviderFuture<'_, Vec<DeadLetterEntry>>;

    /// One entry by id.
    ///
    /// # Errors
    ///
    /// Returns error if the archive cannot be read.
    fn entry(&self, id: i64) -> ProviderFuture<'_, Option<DeadLetterEntry>>;

    /// Move a pending entry to `status`.
    ///
    /// Returns `false` if no pending entry has this id.
    ///
    /// # Errors
    ///
    /// Returns error if the archive cannot be written.
    fn close<'a>(
        &'a self,
        id: i64,
        status: DeadLetterStatus,
        closed_by: &'a str,
        notes: Option<&'a str>,
    ) -> ProviderFuture<'a, bool>;
}
