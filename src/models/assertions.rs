//! Assertion accounting
//!
//! Tracks how many times each assertion kind ran and keeps a log of the
//! arguments it ran with. Log storage for a kind is either unbounded or,
//! once a capacity is set, a fixed-size ring that evicts the oldest entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recorded assertion call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssertionLog {
    /// Debug-formatted arguments
    pub args: Vec<String>,
    /// Failure message when the assertion did not hold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Log storage for one assertion kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LogBuffer<T> {
    Unbounded {
        entries: Vec<T>,
    },
    Ring {
        entries: Vec<T>,
        capacity: usize,
        /// Slot the next entry is written to once the ring is full
        ring_buffer_offset: usize,
    },
}

impl<T> Default for LogBuffer<T> {
    fn default() -> Self {
        LogBuffer::Unbounded {
            entries: Vec::new(),
        }
    }
}

impl<T> LogBuffer<T> {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Start directly in ring mode
    pub fn ring(capacity: usize) -> Self {
        let mut buffer = Self::default();
        buffer.limit(capacity);
        buffer
    }

    pub fn push(&mut self, entry: T) {
        match self {
            LogBuffer::Unbounded { entries } => entries.push(entry),
            LogBuffer::Ring {
                entries,
                capacity,
                ring_buffer_offset,
            } => {
                if *capacity == 0 {
                    return;
                }
                if entries.len() < *capacity {
                    entries.push(entry);
                    *ring_buffer_offset = entries.len() % *capacity;
                } else {
                    entries[*ring_buffer_offset] = entry;
                    *ring_buffer_offset = (*ring_buffer_offset + 1) % *capacity;
                }
            }
        }
    }

    /// Switch to ring mode with the given capacity.
    ///
    /// Only the most recent `capacity` entries survive the transition. Calling
    /// this on a ring re-sizes it the same way.
    pub fn limit(&mut self, capacity: usize) {
        let ordered = std::mem::take(self).into_ordered();
        let skip = ordered.len().saturating_sub(capacity);
        let entries: Vec<T> = ordered.into_iter().skip(skip).collect();
        let ring_buffer_offset = if capacity == 0 {
            0
        } else {
            entries.len() % capacity
        };

        *self = LogBuffer::Ring {
            entries,
            capacity,
            ring_buffer_offset,
        };
    }

    pub fn len(&self) -> usize {
        self.raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw().is_empty()
    }

    pub fn is_ring(&self) -> bool {
        matches!(self, LogBuffer::Ring { .. })
    }

    /// Backing storage in slot order (wrapped for a full ring)
    pub fn raw(&self) -> &[T] {
        match self {
            LogBuffer::Unbounded { entries } | LogBuffer::Ring { entries, .. } => entries,
        }
    }

    /// Entries from oldest to newest
    pub fn ordered(&self) -> Vec<&T> {
        match self {
            LogBuffer::Unbounded { entries } => entries.iter().collect(),
            LogBuffer::Ring {
                entries,
                capacity,
                ring_buffer_offset,
            } => {
                if entries.len() < *capacity {
                    entries.iter().collect()
                } else {
                    let (head, tail) = entries.split_at(*ring_buffer_offset);
                    tail.iter().chain(head.iter()).collect()
                }
            }
        }
    }

    fn into_ordered(self) -> Vec<T> {
        match self {
            LogBuffer::Unbounded { entries } => entries,
            LogBuffer::Ring {
                mut entries,
                capacity,
                ring_buffer_offset,
            } => {
                if entries.len() >= capacity && ring_buffer_offset > 0 {
                    entries.rotate_left(ring_buffer_offset);
                }
                entries
            }
        }
    }
}

/// Assertion activity for one test
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertionMetrics {
    pub logs: BTreeMap<String, LogBuffer<AssertionLog>>,
    pub assertion_counts: BTreeMap<String, u64>,
    pub assertion_failure: bool,
}

impl AssertionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call of an assertion kind.
    ///
    /// New kinds start in ring mode when a capacity is already in force.
    pub fn record(&mut self, name: &str, log: AssertionLog, ring_limit: Option<usize>) {
        if log.failure.is_some() {
            self.assertion_failure = true;
        }
        *self.assertion_counts.entry(name.to_string()).or_insert(0) += 1;

        self.logs
            .entry(name.to_string())
            .or_insert_with(|| match ring_limit {
                Some(capacity) => LogBuffer::ring(capacity),
                None => LogBuffer::unbounded(),
            })
            .push(log);
    }

    /// Convert every log buffer to a ring of the given capacity
    pub fn limit_logs(&mut self, capacity: usize) {
        for buffer in self.logs.values_mut() {
            buffer.limit(capacity);
        }
    }

    pub fn total(&self) -> u64 {
        self.assertion_counts.values().sum()
    }

    pub fn count(&self, name: &str) -> u64 {
        self.assertion_counts.get(name).copied().unwrap_or(0)
    }
}
