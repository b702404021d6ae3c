//! Bounded history of feature snapshots
//!
//! Holds the training window. Capacity is supplied on every push from the
//! live configuration, so a shrinking capacity is caught up immediately.

use crate::models::{FeaturePoint, FeatureSnapshot};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Number of snapshots that fit in `training_period` at one per `interval`
pub fn history_capacity(training_period: Duration, interval: Duration) -> usize {
    let interval_secs = interval.as_secs();
    if interval_secs == 0 {
        return 0;
    }
    (training_period.as_secs() / interval_secs) as usize
}

/// FIFO buffer of snapshots, oldest first. Clones share the snapshots.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    snapshots: VecDeque<Arc<FeatureSnapshot>>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot and evict from the front until within `capacity`.
    /// Returns the number of evicted snapshots.
    pub fn push(&mut self, snapshot: Arc<FeatureSnapshot>, capacity: usize) -> usize {
        self.snapshots.push_back(snapshot);
        self.set_capacity(capacity)
    }

    /// Evict oldest snapshots until at most `capacity` remain
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.snapshots.len() > capacity {
            self.snapshots.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, capacity, "Evicted snapshots from history");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshots oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FeatureSnapshot>> {
        self.snapshots.iter()
    }

    /// Total device rows across all snapshots
    pub fn row_count(&self) -> usize {
        self.snapshots.iter().map(|s| s.len()).sum()
    }

    /// Rows of every snapshot pooled into one training set
    pub fn training_rows(&self) -> Vec<FeaturePoint> {
        let mut rows = Vec::with_capacity(self.row_count());
        for snapshot in &self.snapshots {
            rows.extend(snapshot.points());
        }
        rows
    }
}
