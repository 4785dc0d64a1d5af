use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Interval, Timestamp};

/// Monotonic event counter that can be bumped from any thread.
#[derive(Debug, Default)]
pub struct CpuCounter(AtomicU64);

impl CpuCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one and returns the previous value.
    pub fn increment(&self) -> u64 {
        self.add(1)
    }

    pub fn add(&self, value: u64) -> u64 {
        self.0.fetch_add(value, Ordering::Relaxed)
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A CPU time range, opened with [`begin_at`](Self::begin_at) and closed with
/// [`end_at`](Self::end_at).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuTimestampCounter {
    begin: Option<Timestamp>,
    end: Option<Timestamp>,
}

impl CpuTimestampCounter {
    pub fn begin_at(&mut self, timestamp: Timestamp) {
        self.begin = Some(timestamp);
        self.end = None;
    }

    pub fn end_at(&mut self, timestamp: Timestamp) {
        self.end = Some(timestamp);
    }

    pub fn begin_timestamp(&self) -> Option<Timestamp> {
        self.begin
    }

    /// Length of the closed range, or `None` while it is still open.
    pub fn elapsed(&self) -> Option<Interval> {
        match (self.begin, self.end) {
            (Some(begin), Some(end)) => Some(end.saturating_sub(begin)),
            _ => None,
        }
    }
}
