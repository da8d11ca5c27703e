use super::{RequestLogEntry, RequestLogSink};
use std::collections::VecDeque;
use std::sync::RwLock;

/// Bounded ring buffer of the most recent entries.
pub struct MemoryLogSink {
    buffer: RwLock<VecDeque<RequestLogEntry>>,
    capacity: usize,
}

impl MemoryLogSink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Up to `limit` entries, newest first.
    pub fn get_recent(&self, limit: usize) -> Vec<RequestLogEntry> {
        let buffer = self.buffer.read().unwrap_or_else(|e| e.into_inner());
        buffer.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestLogSink for MemoryLogSink {
    fn log(&self, entry: &RequestLogEntry) {
        let mut buffer = self.buffer.write().unwrap_or_else(|e| e.into_inner());
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(entry.clone());
    }
}
