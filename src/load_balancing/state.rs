//! Per-service cursor state shared by every concurrent selection.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-wide map of service name to round-robin cursor
///
/// Advancing a cursor is a single `fetch_add`, so two concurrent selections for
/// the same service can never observe the same value. The counter wraps on
/// overflow, which the modulo in the selector absorbs.
#[derive(Debug, Default)]
pub struct SelectionState {
    cursors: DashMap<String, AtomicUsize>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current cursor for `service_name` and advance it by one
    pub fn advance(&self, service_name: &str) -> usize {
        // Read lock on the shard for the common case; only the first selection
        // for a name takes the write path.
        if let Some(cursor) = self.cursors.get(service_name) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }

        self.cursors
            .entry(service_name.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }

    /// Current cursor value without advancing it
    pub fn cursor(&self, service_name: &str) -> Option<usize> {
        self.cursors
            .get(service_name)
            .map(|cursor| cursor.load(Ordering::Relaxed))
    }
}
