use std::collections::{HashSet, VecDeque};

/// Bounded record of event keys already dispatched, oldest evicted first.
#[derive(Debug)]
pub(crate) struct ProcessedEventLog {
    cap: usize,
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl ProcessedEventLog {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `false` when `key` was already recorded.
    pub(crate) fn mark_processed(&mut self, key: &str) -> bool {
        if self.index.contains(key) {
            return false;
        }
        self.order.push_back(key.to_string());
        self.index.insert(key.to_string());
        while self.order.len() > self.cap {
            if let Some(removed) = self.order.pop_front() {
                self.index.remove(&removed);
            }
        }
        true
    }
}
