use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Items that can be parked in the failed list with a reason attached.
pub trait QueueItem: Clone {
    fn set_reason(&mut self, reason: String);
    fn reason(&self) -> Option<&str>;
}

/// Ordered pending items plus the failed items of the last attempt.
///
/// An item lives in exactly one of the two lists. `pending` is consumed from
/// the head only; `failed` grows at the tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferQueue<T> {
    pending: VecDeque<T>,
    failed: Vec<T>,
    total: usize,
}

impl<T> Default for TransferQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            failed: Vec::new(),
            total: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueProgress {
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
}

impl<T: QueueItem> TransferQueue<T> {
    /// Replaces the pending list and restarts progress accounting.
    pub fn set_pending(&mut self, items: Vec<T>) {
        self.total = items.len();
        self.pending = items.into();
    }

    pub fn head(&self) -> Option<&T> {
        self.pending.front()
    }

    pub fn consume_head(&mut self) -> Option<T> {
        self.pending.pop_front()
    }

    /// Overwrites the head with an updated copy of itself. No-op when
    /// nothing is pending.
    pub fn replace_head(&mut self, item: T) {
        if let Some(head) = self.pending.front_mut() {
            *head = item;
        }
    }

    pub fn move_head_to_error(&mut self, reason: impl Into<String>) -> bool {
        let Some(mut item) = self.pending.pop_front() else {
            return false;
        };
        item.set_reason(reason.into());
        self.failed.push(item);
        true
    }

    /// Bulk retry: the failed items, in failure order, become the new
    /// pending list.
    pub fn drain_errors_to_pending(&mut self) {
        let failed = std::mem::take(&mut self.failed);
        self.set_pending(failed);
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.failed.clear();
        self.total = 0;
    }

    pub fn pending(&self) -> impl Iterator<Item = &T> {
        self.pending.iter()
    }

    pub fn failed(&self) -> &[T] {
        &self.failed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.failed.is_empty()
    }

    pub fn progress(&self) -> QueueProgress {
        QueueProgress {
            processed: self.total.saturating_sub(self.pending.len()),
            total: self.total,
            failed: self.failed.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Item {
        name: String,
        reason: Option<String>,
    }

    impl QueueItem for Item {
        fn set_reason(&mut self, reason: String) {
            self.reason = Some(reason);
        }

        fn reason(&self) -> Option<&str> {
            self.reason.as_deref()
        }
    }

    fn items(names: &[&str]) -> Vec<Item> {
        names
            .iter()
            .map(|name| Item {
                name: name.to_string(),
                reason: None,
            })
            .collect()
    }

    #[test]
    fn consume_head_visits_items_in_insertion_order_once() {
        let mut queue = TransferQueue::default();
        queue.set_pending(items(&["a", "b", "c"]));

        let mut seen = Vec::new();
        while let Some(item) = queue.consume_head() {
            seen.push(item.name);
        }

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
        assert_eq!(queue.consume_head(), None);
    }

    #[test]
    fn failed_items_drain_back_in_failure_order() {
        let mut queue = TransferQueue::default();
        queue.set_pending(items(&["a", "b", "c", "d"]));

        assert!(queue.move_head_to_error("first"));
        queue.consume_head();
        assert!(queue.move_head_to_error("second"));
        queue.consume_head();

        assert_eq!(queue.failed_len(), 2);
        assert_eq!(queue.failed()[0].reason(), Some("first"));

        queue.drain_errors_to_pending();

        let pending: Vec<_> = queue.pending().map(|i| i.name.as_str()).collect();
        assert_eq!(pending, vec!["a", "c"]);
        assert_eq!(queue.failed_len(), 0);
        assert_eq!(queue.progress().total, 2);
    }

    #[test]
    fn replace_head_keeps_position_and_enrichment() {
        let mut queue = TransferQueue::default();
        queue.set_pending(items(&["a", "b"]));

        queue.replace_head(Item {
            name: "a2".into(),
            reason: None,
        });
        queue.move_head_to_error("boom");

        assert_eq!(queue.failed()[0].name, "a2");
        assert_eq!(queue.head().map(|i| i.name.as_str()), Some("b"));
    }

    #[test]
    fn move_head_to_error_on_empty_queue_is_noop() {
        let mut queue: TransferQueue<Item> = TransferQueue::default();
        assert!(!queue.move_head_to_error("nothing"));
        assert_eq!(queue.failed_len(), 0);
    }

    #[test]
    fn progress_counts_from_original_total() {
        let mut queue = TransferQueue::default();
        queue.set_pending(items(&["a", "b", "c"]));
        queue.consume_head();
        queue.move_head_to_error("boom");

        assert_eq!(
            queue.progress(),
            QueueProgress {
                processed: 2,
                total: 3,
                failed: 1,
            }
        );
    }

    #[test]
    fn reset_clears_both_lists() {
        let mut queue = TransferQueue::default();
        queue.set_pending(items(&["a", "b"]));
        queue.move_head_to_error("boom");
        queue.reset();

        assert!(queue.is_empty());
        assert_eq!(queue.progress(), QueueProgress::default());
    }

    #[test]
    fn round_trips_through_json() {
        let mut queue = TransferQueue::default();
        queue.set_pending(items(&["a", "b"]));
        queue.move_head_to_error("boom");

        let encoded = serde_json::to_string(&queue).unwrap();
        let decoded: TransferQueue<Item> = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, queue);
    }
}
