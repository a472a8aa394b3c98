use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

/// One unit of dispatch work. The attempt counter travels with the entry so a
/// retry chain keeps counting across assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedOrder {
    pub order_id: Uuid,
    pub attempt: u32,
}

/// Double-ended queue of pending order ids. New work enters at the tail,
/// retries at the head, so reclaimed orders are attempted before fresh ones.
/// `pop_front` is the single atomic consumption point: two concurrent callers
/// never receive the same entry.
#[derive(Debug, Default)]
pub struct WorkQueue {
    inner: Mutex<VecDeque<QueuedOrder>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, order_id: Uuid) {
        self.lock().push_back(QueuedOrder {
            order_id,
            attempt: 0,
        });
    }

    pub fn push_front(&self, entry: QueuedOrder) {
        self.lock().push_front(entry);
    }

    pub fn pop_front(&self) -> Option<QueuedOrder> {
        self.lock().pop_front()
    }

    /// Deletes every occurrence of the order id. Idempotent; returns how many
    /// entries were dropped. Defensive cleanup only.
    pub fn remove_all(&self, order_id: Uuid) -> usize {
        let mut queue = self.lock();
        let before = queue.len();
        queue.retain(|entry| entry.order_id != order_id);
        before - queue.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedOrder>> {
        // A panicked holder must not wedge dispatch; the queue stays usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use uuid::Uuid;

    use super::{QueuedOrder, WorkQueue};

    #[test]
    fn pops_in_fifo_order() {
        let queue = WorkQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        queue.push_back(first);
        queue.push_back(second);

        assert_eq!(queue.pop_front().unwrap().order_id, first);
        assert_eq!(queue.pop_front().unwrap().order_id, second);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn head_enqueue_wins_over_waiting_work() {
        let queue = WorkQueue::new();
        let fresh = Uuid::new_v4();
        let retry = Uuid::new_v4();

        queue.push_back(fresh);
        queue.push_front(QueuedOrder {
            order_id: retry,
            attempt: 1,
        });

        let popped = queue.pop_front().unwrap();
        assert_eq!(popped.order_id, retry);
        assert_eq!(popped.attempt, 1);
    }

    #[test]
    fn remove_all_is_idempotent() {
        let queue = WorkQueue::new();
        let order = Uuid::new_v4();

        queue.push_back(order);
        queue.push_back(Uuid::new_v4());
        queue.push_front(QueuedOrder {
            order_id: order,
            attempt: 2,
        });

        assert_eq!(queue.remove_all(order), 2);
        assert_eq!(queue.remove_all(order), 0);
        assert_eq!(queue.remove_all(Uuid::new_v4()), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn concurrent_pops_never_share_an_entry() {
        let queue = Arc::new(WorkQueue::new());
        let total = 200;
        for _ in 0..total {
            queue.push_back(Uuid::new_v4());
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(std::thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(entry) = queue.pop_front() {
                    seen.push(entry.order_id);
                }
                seen
            }));
        }

        let mut all = HashSet::new();
        let mut count = 0;
        for handle in handles {
            for id in handle.join().unwrap() {
                count += 1;
                assert!(all.insert(id), "order popped twice");
            }
        }
        assert_eq!(count, total);
        assert!(queue.is_empty());
    }
}
