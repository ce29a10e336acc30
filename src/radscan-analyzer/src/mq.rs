// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Typed FIFO with urgent insert, blocking read and non-blocking poll.
//!
//! Any number of writers; the contract is that exactly one thread dequeues
//! from a given queue at a time. Payload ownership travels with the
//! message, so draining a stale queue is just dropping what `poll` returns.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub struct MessageQueue<T> {
    inner: Mutex<VecDeque<T>>,
    cond: Condvar,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    /// Enqueue at the tail.
    pub fn write(&self, msg: T) {
        let mut q = self.inner.lock().expect("mq mutex");
        q.push_back(msg);
        self.cond.notify_one();
    }

    /// Enqueue at the head: delivered before any pending non-urgent message.
    pub fn write_urgent(&self, msg: T) {
        let mut q = self.inner.lock().expect("mq mutex");
        q.push_front(msg);
        self.cond.notify_one();
    }

    /// Blocking dequeue.
    pub fn read(&self) -> T {
        let mut q = self.inner.lock().expect("mq mutex");
        loop {
            if let Some(msg) = q.pop_front() {
                return msg;
            }
            q = self.cond.wait(q).expect("mq condvar");
        }
    }

    /// Non-blocking dequeue.
    pub fn poll(&self) -> Option<T> {
        self.inner.lock().expect("mq mutex").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("mq mutex").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let mq = MessageQueue::new();
        mq.write(1);
        mq.write(2);
        mq.write(3);
        assert_eq!(mq.read(), 1);
        assert_eq!(mq.read(), 2);
        assert_eq!(mq.read(), 3);
    }

    #[test]
    fn urgent_preempts_pending() {
        let mq = MessageQueue::new();
        mq.write("a");
        mq.write("b");
        mq.write_urgent("halt");
        // Non-urgent writes after the urgent one do not overtake it.
        mq.write("c");
        assert_eq!(mq.read(), "halt");
        assert_eq!(mq.read(), "a");
    }

    #[test]
    fn two_urgent_lifo_among_themselves() {
        let mq = MessageQueue::new();
        mq.write_urgent(1);
        mq.write_urgent(2);
        assert_eq!(mq.read(), 2);
        assert_eq!(mq.read(), 1);
    }

    #[test]
    fn poll_returns_none_on_empty() {
        let mq: MessageQueue<u32> = MessageQueue::new();
        assert_eq!(mq.poll(), None);
        mq.write(7);
        assert_eq!(mq.poll(), Some(7));
        assert_eq!(mq.poll(), None);
    }

    #[test]
    fn blocking_read_wakes_on_write() {
        let mq = Arc::new(MessageQueue::new());
        let reader = {
            let mq = mq.clone();
            std::thread::spawn(move || mq.read())
        };
        std::thread::sleep(Duration::from_millis(20));
        mq.write(42);
        assert_eq!(reader.join().expect("reader"), 42);
    }
}
