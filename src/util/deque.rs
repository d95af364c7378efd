//! Shared pools backing the remembered sets and the global trace queues:
//! multi-producer/multi-consumer buffers of pending work, filled in blocks by
//! the per-thread local queues and drained in blocks by collector threads.

use crossbeam::deque::{Injector, Steal};

/// An unordered pool of work blocks. Producers push whole blocks (a flushed
/// local buffer); consumers pop whole blocks. Entries are consumed exactly
/// once; they are never deduplicated.
pub struct SharedPool<T> {
    queue: Injector<Vec<T>>,
}

impl<T> SharedPool<T> {
    pub fn new() -> Self {
        Self {
            queue: Injector::new(),
        }
    }

    /// Push a block of entries. Empty blocks are dropped.
    pub fn push(&self, block: Vec<T>) {
        if !block.is_empty() {
            self.queue.push(block);
        }
    }

    /// Pop one block, or None if the pool is (momentarily) empty.
    pub fn pop(&self) -> Option<Vec<T>> {
        loop {
            match self.queue.steal() {
                Steal::Success(block) => return Some(block),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Discard every pending block.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl<T> Default for SharedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn push_pop() {
        let pool = SharedPool::new();
        assert!(pool.is_empty());
        pool.push(vec![1, 2, 3]);
        pool.push(Vec::<i32>::new());
        assert!(!pool.is_empty());
        assert_eq!(pool.pop().unwrap(), vec![1, 2, 3]);
        assert!(pool.pop().is_none());
    }

    #[test]
    fn clear_discards_everything() {
        let pool = SharedPool::new();
        pool.push(vec![1]);
        pool.push(vec![2]);
        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn entries_are_consumed_exactly_once() {
        let pool = Arc::new(SharedPool::new());
        for i in 0..64 {
            pool.push(vec![i]);
        }
        let mut seen = Vec::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(block) = pool.pop() {
                        taken.extend(block);
                    }
                    taken
                })
            })
            .collect();
        for handle in handles {
            seen.extend(handle.join().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
    }
}
