//! Per-partition commit bookkeeping.
//!
//! Deliveries are acknowledged out of order by the worker pool, but a Kafka
//! commit covers every offset below it. The committable position of a
//! partition is therefore the lowest offset still in flight, or one past the
//! highest offset seen once nothing is in flight.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct PartitionState {
    in_flight: BTreeSet<i64>,
    highest: Option<i64>,
    committed: Option<i64>,
}

/// Tracks in-flight offsets and yields commit positions that only advance.
#[derive(Debug, Default)]
pub(crate) struct OffsetTracker {
    partitions: HashMap<i32, PartitionState>,
}

impl OffsetTracker {
    /// Record a message handed to the worker pool.
    pub(crate) fn start(&mut self, partition: i32, offset: i64) {
        let state = self.partitions.entry(partition).or_default();
        state.in_flight.insert(offset);
        state.highest = Some(state.highest.map_or(offset, |h| h.max(offset)));
        if state.committed.is_none() {
            state.committed = Some(offset);
        }
    }

    /// Record a finished message; returns the new commit position if it
    /// advanced.
    pub(crate) fn complete(&mut self, partition: i32, offset: i64) -> Option<i64> {
        let state = self.partitions.get_mut(&partition)?;
        state.in_flight.remove(&offset);

        let next = match state.in_flight.first() {
            Some(&lowest) => lowest,
            None => state.highest? + 1,
        };

        if state.committed.is_some_and(|committed| committed >= next) {
            return None;
        }
        state.committed = Some(next);
        Some(next)
    }

    /// Forget partitions after a rebalance; their uncommitted messages go to
    /// the new owner.
    pub(crate) fn clear(&mut self) {
        self.partitions.clear();
    }
}
