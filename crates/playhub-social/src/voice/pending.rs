//! FIFO of producer announcements that arrived before the session could
//! consume them.

use std::collections::VecDeque;

use super::types::ProducerAnnouncement;

#[derive(Debug, Default)]
pub struct PendingProducerQueue {
    entries: VecDeque<ProducerAnnouncement>,
}

impl PendingProducerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, entry: ProducerAnnouncement) {
        self.entries.push_back(entry);
    }

    /// Take the oldest entry. The queue is drained one entry at a time so
    /// that entries enqueued, or removed by a peer leaving, while an earlier
    /// one is being consumed are seen in order.
    pub fn pop(&mut self) -> Option<ProducerAnnouncement> {
        self.entries.pop_front()
    }

    /// Drop entries matching `pred`, returning how many were removed.
    pub fn remove_where(&mut self, pred: impl Fn(&ProducerAnnouncement) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(e));
        before - self.entries.len()
    }

    /// Discard everything, returning how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
