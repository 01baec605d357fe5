//! The line queue between the background reader and client code.
//!
//! [`LineQueue`] is an unbounded FIFO of [`ResponseUnit`]s shared by cheap
//! clones. The reader pushes, the client drains; neither side ever waits on
//! the other.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::fault::ReaderFault;
use crate::frame::address_fields;

/// One element of the line queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseUnit {
    /// A complete line, verbatim, including its line separator.
    Line(String),
    /// The fault that stopped the reader.
    Fault(ReaderFault),
}

impl ResponseUnit {
    /// The line text, if this unit is a line.
    pub fn as_line(&self) -> Option<&str> {
        match self {
            ResponseUnit::Line(line) => Some(line),
            ResponseUnit::Fault(_) => None,
        }
    }

    /// Whether this unit is a captured fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, ResponseUnit::Fault(_))
    }
}

impl fmt::Display for ResponseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseUnit::Line(line) => write!(f, "{}", line.trim_end_matches(['\r', '\n'])),
            ResponseUnit::Fault(fault) => write!(f, "reader fault: {fault}"),
        }
    }
}

/// Set of address characters used to select response lines.
///
/// A line matches when its character at position 1 or position 2 is in
/// the set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineFilter {
    ids: BTreeSet<char>,
}

impl LineFilter {
    /// Build a filter from a set of address characters.
    pub fn new(ids: impl IntoIterator<Item = char>) -> Self {
        LineFilter {
            ids: ids.into_iter().collect(),
        }
    }

    /// Whether `line` is addressed to or from one of the filter's ids.
    pub fn matches(&self, line: &str) -> bool {
        let (first, second) = address_fields(line);
        [first, second]
            .into_iter()
            .flatten()
            .any(|c| self.ids.contains(&c))
    }

    /// Whether a queued unit should be surfaced.
    ///
    /// Faults always pass so that a dead reader is never hidden by a filter.
    pub fn admits(&self, unit: &ResponseUnit) -> bool {
        match unit {
            ResponseUnit::Line(line) => self.matches(line),
            ResponseUnit::Fault(_) => true,
        }
    }
}

impl FromStr for LineFilter {
    type Err = std::convert::Infallible;

    /// Every character of `s` becomes one id, so `"12"` listens to `1` and `2`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(LineFilter::new(s.chars()))
    }
}

/// Unbounded, thread-safe FIFO of [`ResponseUnit`]s.
#[derive(Debug, Clone, Default)]
pub struct LineQueue {
    inner: Arc<Mutex<VecDeque<ResponseUnit>>>,
}

impl LineQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn units(&self) -> MutexGuard<'_, VecDeque<ResponseUnit>> {
        // A panicking holder cannot leave the deque half-modified.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a unit to the tail.
    pub fn push(&self, unit: ResponseUnit) {
        self.units().push_back(unit);
    }

    /// Remove and return the head, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<ResponseUnit> {
        self.units().pop_front()
    }

    /// Number of queued units.
    pub fn len(&self) -> usize {
        self.units().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.units().is_empty()
    }

    /// Pop until empty and return the units that pass `filter`.
    ///
    /// Without a filter every unit is returned in arrival order. With one,
    /// non-matching lines are dropped; the queue is emptied either way.
    /// Fault units are never filtered out, so a filtered drain can return
    /// a fault whose text matches none of the filter's ids.
    /// Units pushed while the drain runs may or may not be included.
    pub fn drain_all(&self, filter: Option<&LineFilter>) -> Vec<ResponseUnit> {
        let mut surfaced = Vec::new();
        while let Some(unit) = self.try_pop() {
            match filter {
                Some(filter) if !filter.admits(&unit) => {
                    tracing::trace!(unit = %unit, "Discarding unmatched response");
                }
                _ => surfaced.push(unit),
            }
        }
        surfaced
    }
}
