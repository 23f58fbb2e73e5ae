//! PriorityQueue - bounded, priority-ordered command buffer
//!
//! A semaphore counts free slots and a mutex guards one FIFO bucket per
//! [`Priority`]. Consumers take from the lowest non-empty bucket, so ties
//! within a priority keep insertion order.

use crate::{EnqueueError, QueueError};
use futures_util::Stream;
use std::collections::VecDeque;
use std::sync::Mutex;
use tessera_core::Priority;
use tokio::sync::{Notify, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

struct Buckets<T> {
    queues: [VecDeque<T>; Priority::COUNT],
    len: usize,
}

impl<T> Buckets<T> {
    fn pop(&mut self) -> Option<T> {
        let item = self.queues.iter_mut().find_map(VecDeque::pop_front);
        match (&item, self.len) {
            (Some(_), 0) => panic!("priority queue yielded an item while counting none"),
            (None, len) if len > 0 => panic!("priority queue counts {len} items but every bucket is empty"),
            (Some(_), _) => self.len -= 1,
            (None, _) => {}
        }
        item
    }
}

pub struct PriorityQueue<T> {
    capacity: usize,
    slots: Semaphore,
    buckets: Mutex<Buckets<T>>,
    ready: Notify,
    closed: CancellationToken,
}

impl<T> PriorityQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Semaphore::new(capacity),
            buckets: Mutex::new(Buckets {
                queues: std::array::from_fn(|_| VecDeque::new()),
                len: 0,
            }),
            ready: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().map(|b| b.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait for a free slot, then queue `item`.
    pub async fn enqueue(&self, priority: Priority, item: T) -> Result<(), EnqueueError<T>> {
        let acquired = tokio::select! {
            _ = self.closed.cancelled() => false,
            permit = self.slots.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    true
                }
                Err(_) => false,
            },
        };
        if !acquired {
            return Err(EnqueueError {
                reason: QueueError::Closed,
                item,
            });
        }
        self.push(priority, item)
    }

    /// Queue `item` if a slot is free right now.
    pub fn try_enqueue(&self, priority: Priority, item: T) -> Result<(), EnqueueError<T>> {
        if self.is_closed() {
            return Err(EnqueueError {
                reason: QueueError::Closed,
                item,
            });
        }
        match self.slots.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(TryAcquireError::NoPermits) => {
                return Err(EnqueueError {
                    reason: QueueError::Full,
                    item,
                })
            }
            Err(TryAcquireError::Closed) => {
                return Err(EnqueueError {
                    reason: QueueError::Closed,
                    item,
                })
            }
        }
        self.push(priority, item)
    }

    /// Place an item whose slot is already taken.
    fn push(&self, priority: Priority, item: T) -> Result<(), EnqueueError<T>> {
        let mut buckets = match self.buckets.lock() {
            Ok(buckets) if !self.is_closed() => buckets,
            _ => {
                self.slots.add_permits(1);
                return Err(EnqueueError {
                    reason: QueueError::Closed,
                    item,
                });
            }
        };
        buckets.queues[priority.index()].push_back(item);
        buckets.len += 1;
        drop(buckets);
        self.ready.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<T> {
        let item = self.buckets.lock().ok()?.pop();
        if item.is_some() {
            self.slots.add_permits(1);
        }
        item
    }

    /// Next item in priority order, or `None` once the queue is closed.
    pub async fn next(&self) -> Option<T> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(item) = self.pop() {
                return Some(item);
            }
            tokio::select! {
                _ = self.ready.notified() => {}
                _ = self.closed.cancelled() => {}
            }
        }
    }

    /// Items in priority order until [`close`](Self::close).
    pub fn drain(&self) -> impl Stream<Item = T> + '_ {
        futures_util::stream::unfold(self, |queue| async move { queue.next().await.map(|item| (item, queue)) })
    }

    /// End every drain and wake blocked enqueuers with [`QueueError::Closed`].
    pub fn close(&self) {
        self.closed.cancel();
        self.slots.close();
    }

    /// Remove and return everything still queued, highest priority first.
    pub fn take_pending(&self) -> Vec<T> {
        let Ok(mut buckets) = self.buckets.lock() else {
            return Vec::new();
        };
        buckets.len = 0;
        buckets.queues.iter_mut().flat_map(|q| q.drain(..)).collect()
    }
}
