//! Bounded blocking FIFO.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{OfferError, TakeError};

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    torn_down: bool,
}

/// Thread-safe FIFO holding at most `bound` items.
///
/// Producers never block: a full queue rejects the offer and hands the item
/// back. Consumers block in [`wait_and_take`](Self::wait_and_take) until an
/// item arrives or the queue is destroyed. A bound of 0 makes the queue
/// permanently full.
#[derive(Debug)]
pub struct BoundedBlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    bound: usize,
}

impl<T> BoundedBlockingQueue<T> {
    /// Create an empty queue
    pub fn new(bound: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                torn_down: false,
            }),
            available: Condvar::new(),
            bound,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // Every critical section leaves the deque consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Maximum number of items
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether no item is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`destroy`](Self::destroy) has been called
    pub fn is_destroyed(&self) -> bool {
        self.lock().torn_down
    }

    /// Append an item without blocking
    pub fn offer(&self, item: T) -> Result<(), OfferError<T>> {
        let mut inner = self.lock();

        if inner.torn_down {
            return Err(OfferError::Interrupted(item));
        }
        if inner.items.len() >= self.bound {
            return Err(OfferError::BoundExceeded(item));
        }
        if inner.items.try_reserve(1).is_err() {
            return Err(OfferError::OutOfMemory(item));
        }

        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest item, blocking until one is available
    pub fn wait_and_take(&self) -> Result<T, TakeError> {
        let mut inner = self.lock();
        loop {
            if inner.torn_down {
                return Err(TakeError::Interrupted);
            }
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Like [`wait_and_take`](Self::wait_and_take), giving up after `timeout`
    pub fn wait_and_take_timeout(&self, timeout: Duration) -> Result<T, TakeError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if inner.torn_down {
                return Err(TakeError::Interrupted);
            }
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TakeError::TimedOut);
            }
            inner = match self.available.wait_timeout(inner, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Remove the oldest item if there is one
    pub fn try_take(&self) -> Option<T> {
        let mut inner = self.lock();
        if inner.torn_down {
            return None;
        }
        inner.items.pop_front()
    }

    /// Tear the queue down.
    ///
    /// Every blocked and later take fails with [`TakeError::Interrupted`],
    /// every later offer with [`OfferError::Interrupted`]. Items still
    /// queued are returned to the caller in FIFO order.
    pub fn destroy(&self) -> Remaining<T> {
        let mut inner = self.lock();
        inner.torn_down = true;
        let items = std::mem::take(&mut inner.items);
        drop(inner);

        self.available.notify_all();
        if !items.is_empty() {
            debug!("Queue destroyed with {} items still queued", items.len());
        }
        Remaining {
            items: items.into_iter(),
        }
    }
}

/// Items left in a queue when it was destroyed
#[derive(Debug)]
pub struct Remaining<T> {
    items: std::collections::vec_deque::IntoIter<T>,
}

impl<T> Iterator for Remaining<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<T> ExactSizeIterator for Remaining<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_bound_zero_is_always_full() {
        let queue = BoundedBlockingQueue::new(0);
        assert!(matches!(queue.offer(1), Err(OfferError::BoundExceeded(1))));
        assert!(queue.is_empty());
        assert_eq!(queue.try_take(), None);
    }

    #[test]
    fn test_bound_enforced_and_item_returned() {
        let queue = BoundedBlockingQueue::new(2);
        queue.offer("a".to_string()).unwrap();
        queue.offer("b".to_string()).unwrap();

        let rejected = queue.offer("c".to_string()).unwrap_err();
        assert!(matches!(rejected, OfferError::BoundExceeded(_)));
        assert_eq!(rejected.into_inner(), "c");
        assert_eq!(queue.len(), 2);

        // Room again after a take
        assert_eq!(queue.wait_and_take().unwrap(), "a");
        queue.offer("c".to_string()).unwrap();
        assert_eq!(queue.wait_and_take().unwrap(), "b");
        assert_eq!(queue.wait_and_take().unwrap(), "c");
    }

    #[test]
    fn test_take_blocks_until_offer() {
        let queue = Arc::new(BoundedBlockingQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_and_take())
        };

        thread::sleep(Duration::from_millis(50));
        queue.offer(42u32).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(42));
    }

    #[test]
    fn test_timeout() {
        let queue: BoundedBlockingQueue<u8> = BoundedBlockingQueue::new(1);
        let started = Instant::now();
        assert_eq!(
            queue.wait_and_take_timeout(Duration::from_millis(50)),
            Err(TakeError::TimedOut)
        );
        assert!(started.elapsed() >= Duration::from_millis(50));

        queue.offer(7).unwrap();
        assert_eq!(queue.wait_and_take_timeout(Duration::from_millis(50)), Ok(7));
    }

    #[test]
    fn test_destroy_interrupts_waiters() {
        let queue: Arc<BoundedBlockingQueue<u32>> = Arc::new(BoundedBlockingQueue::new(4));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.wait_and_take())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.destroy().len(), 0);

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(TakeError::Interrupted));
        }
        assert!(matches!(queue.offer(1), Err(OfferError::Interrupted(1))));
        assert_eq!(
            queue.wait_and_take_timeout(Duration::from_secs(1)),
            Err(TakeError::Interrupted)
        );
    }

    #[test]
    fn test_destroy_returns_remaining_in_order() {
        let queue = BoundedBlockingQueue::new(8);
        for i in 0..5 {
            queue.offer(i).unwrap();
        }
        queue.wait_and_take().unwrap();

        let remaining = queue.destroy();
        assert_eq!(remaining.len(), 4);
        assert_eq!(remaining.collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(queue.is_destroyed());
        assert_eq!(queue.destroy().len(), 0);
    }

    #[test]
    fn test_fifo_under_contention() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;
        const CONSUMERS: usize = 3;

        let queue = Arc::new(BoundedBlockingQueue::new(16));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        let mut item = (p, seq);
                        loop {
                            match queue.offer(item) {
                                Ok(()) => break,
                                Err(OfferError::BoundExceeded(back)) => {
                                    item = back;
                                    thread::yield_now();
                                }
                                Err(e) => panic!("unexpected offer failure: {e}"),
                            }
                        }
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Ok(item) = queue.wait_and_take() {
                        taken.push(item);
                    }
                    taken
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(queue.destroy().len(), 0);

        let mut all_taken = Vec::with_capacity(PRODUCERS * PER_PRODUCER);
        for consumer in consumers {
            let taken = consumer.join().unwrap();
            all_taken.extend_from_slice(&taken);

            // Each consumer sees every producer's items in offer order
            let mut last: HashMap<usize, usize> = HashMap::new();
            for (p, seq) in taken {
                if let Some(prev) = last.insert(p, seq) {
                    assert!(seq > prev, "producer {p}: {seq} after {prev}");
                }
            }
        }
        // Every offered item taken exactly once
        all_taken.sort_unstable();
        let offered: Vec<_> = (0..PRODUCERS)
            .flat_map(|p| (0..PER_PRODUCER).map(move |seq| (p, seq)))
            .collect();
        assert_eq!(all_taken, offered);
    }
}
