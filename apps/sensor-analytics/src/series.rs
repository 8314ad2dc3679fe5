use crate::reading::{Reading, ReadingId};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Applied,
    Duplicate,
    OutOfWindow,
}

/// Visible window of readings: sorted by `(created_at, id)`, unique by id, at most `capacity`
/// long. The oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    capacity: usize,
    entries: VecDeque<Reading>,
    ids: HashSet<ReadingId>,
}

impl SeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.entries.back()
    }

    /// Replace the contents with an already sorted query result, keeping the most recent
    /// `capacity` distinct readings. A repeated id keeps its first occurrence.
    pub fn seed(&mut self, readings: Vec<Reading>) {
        self.entries.clear();
        self.ids.clear();

        for reading in readings {
            if self.ids.insert(reading.id) {
                self.entries.push_back(reading);
            }
        }
        self.evict_overflow();
    }

    pub fn merge(&mut self, reading: Reading) -> MergeOutcome {
        if self.ids.contains(&reading.id) {
            return MergeOutcome::Duplicate;
        }

        let at_capacity = self.entries.len() >= self.capacity;
        if at_capacity {
            if let Some(head) = self.entries.front() {
                if reading.ordering_key() < head.ordering_key() {
                    return MergeOutcome::OutOfWindow;
                }
            }
        }

        self.ids.insert(reading.id);
        let in_order = self
            .entries
            .back()
            .map(|tail| tail.ordering_key() <= reading.ordering_key())
            .unwrap_or(true);
        if in_order {
            self.entries.push_back(reading);
        } else {
            let key = reading.ordering_key();
            let position = self
                .entries
                .partition_point(|entry| entry.ordering_key() <= key);
            self.entries.insert(position, reading);
        }

        self.evict_overflow();
        MergeOutcome::Applied
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.ids.remove(&evicted.id);
            }
        }
    }

    /// Owned copy of the series, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for SeriesBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
