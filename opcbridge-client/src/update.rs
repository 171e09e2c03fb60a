//! Incoming update records and the per-leaf bounded queue
//!
//! An update is created for every data element after results of a service
//! call have been received, or as a result of a special situation such as
//! connection loss. When updates are pushed to a full queue, either the
//! front or the back update (depending on the queue's discard policy) is
//! dropped and the override counter of the surviving update is stepped up,
//! so consumers can see how many values they missed.

use opcbridge_core::{ProcessReason, StatusCode, Variant};
use std::collections::VecDeque;

/// One update for a data element
#[derive(Debug, Clone)]
pub struct Update {
    /// Client timestamp, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Reason the update was generated
    pub reason: ProcessReason,
    /// Decoded value; `None` for data-less events
    pub data: Option<Variant>,
    /// Status code related to the update
    pub status: StatusCode,
    overrides: u64,
}

impl Update {
    /// Create an update carrying data
    pub fn with_data(timestamp: u64, reason: ProcessReason, data: Variant, status: StatusCode) -> Self {
        Self {
            timestamp,
            reason,
            data: Some(data),
            status,
            overrides: 0,
        }
    }

    /// Create a data-less update, for events and service results without
    /// a value
    pub fn event(timestamp: u64, reason: ProcessReason, status: StatusCode) -> Self {
        Self {
            timestamp,
            reason,
            data: None,
            status,
            overrides: 0,
        }
    }

    /// Replace this update with a newer one, accumulating its override
    /// count (used when the newest queued update absorbs an incoming one)
    pub fn override_with(&mut self, other: Update) {
        self.timestamp = other.timestamp;
        self.reason = other.reason;
        self.overrides += other.overrides + 1;
        self.data = other.data;
        self.status = other.status;
    }

    /// Step up the override counter, carrying over drops of updates in
    /// front of this one
    pub fn add_overrides(&mut self, count: u64) {
        self.overrides += count + 1;
    }

    /// Number of updates this one replaced
    pub fn overrides(&self) -> u64 {
        self.overrides
    }

    /// Check if the update carries data
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// Fixed-size FIFO queue of incoming updates
///
/// Not internally synchronized; the owning element tree serializes access.
#[derive(Debug)]
pub struct UpdateQueue {
    queue: VecDeque<Update>,
    capacity: usize,
    discard_oldest: bool,
}

impl UpdateQueue {
    pub fn new(capacity: usize, discard_oldest: bool) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            discard_oldest,
        }
    }

    /// Insert an update at the end, applying the discard policy when full
    ///
    /// Returns `true` if the pushed element was the first one, i.e. the
    /// queue transitioned from empty to non-empty.
    pub fn push(&mut self, update: Update) -> bool {
        if self.queue.len() < self.capacity {
            let was_first = self.queue.is_empty();
            self.queue.push_back(update);
            was_first
        } else if self.discard_oldest {
            if let Some(dropped) = self.queue.pop_front() {
                if let Some(front) = self.queue.front_mut() {
                    front.add_overrides(dropped.overrides());
                    self.queue.push_back(update);
                } else {
                    // Capacity 1: the new update replaces the dropped one.
                    let mut update = update;
                    update.add_overrides(dropped.overrides());
                    self.queue.push_back(update);
                }
            }
            false
        } else {
            if let Some(back) = self.queue.back_mut() {
                back.override_with(update);
            }
            false
        }
    }

    /// Remove and return the front update, plus the reason of the next
    /// queued element (`None` when the popped one was the last)
    pub fn pop(&mut self) -> Option<(Update, Option<ProcessReason>)> {
        let update = self.queue.pop_front()?;
        let next_reason = self.queue.front().map(|u| u.reason);
        Some((update, next_reason))
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
