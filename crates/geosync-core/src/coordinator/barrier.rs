//! Counting barrier over download completion events.

use std::collections::HashSet;

use crate::browser::{DownloadEvent, DownloadState};

/// Opens exactly once, when `expected` distinct downloads have completed.
///
/// Repeated completion events for the same download, and any event after the
/// barrier opened, are ignored.
#[derive(Debug)]
pub struct CompletionBarrier {
    expected: usize,
    completed: HashSet<String>,
    opened: bool,
}

impl CompletionBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            completed: HashSet::new(),
            opened: expected == 0,
        }
    }

    /// Feed one event. Returns true only for the event that opens the barrier.
    pub fn observe(&mut self, event: &DownloadEvent) -> bool {
        if self.opened || event.state != DownloadState::Completed {
            return false;
        }
        self.completed.insert(event.guid.clone());
        if self.completed.len() >= self.expected {
            self.opened = true;
            return true;
        }
        false
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn completed(&self) -> usize {
        self.completed.len()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}
