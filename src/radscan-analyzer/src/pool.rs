// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded pool of reusable complex-sample buffers.
//!
//! Buffers are allocated lazily until `max_buffers` is reached; after that,
//! `acquire` blocks on the pool's free queue and `try_acquire` returns
//! `None`, which is how back-pressure propagates to the producer. A halted
//! pool wakes every waiter with a poisoned result.

use std::borrow::Cow;
use std::sync::Mutex;

use radscan_core::Sample;

use crate::mq::MessageQueue;

#[derive(Debug, Clone, Copy)]
pub struct PoolParams {
    /// Samples per buffer.
    pub alloc_size: usize,
    pub max_buffers: usize,
    /// Present reads past the end as wrapping to the beginning.
    pub vm_circularity: bool,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            alloc_size: 512,
            max_buffers: 16,
            vm_circularity: false,
        }
    }
}

/// A buffer checked out of the pool. Return it with
/// [`SampleBufferPool::give`]; dropping it instead shrinks the pool by one
/// buffer permanently.
pub struct SampleBuffer {
    data: Vec<Sample>,
    circular: bool,
    /// Samples actually written by the producer.
    len: usize,
}

impl SampleBuffer {
    fn new(alloc_size: usize, circular: bool) -> Self {
        Self {
            data: vec![Sample::new(0.0, 0.0); alloc_size],
            circular,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the buffer, truncating to capacity.
    pub fn fill_from(&mut self, src: &[Sample]) -> usize {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        self.len = n;
        n
    }

    pub fn data(&self) -> &[Sample] {
        &self.data[..self.len]
    }

    /// A window of `len` samples starting at `start`. On a circular buffer
    /// the window may wrap past the end and continue at the beginning (the
    /// wrap materializes a copy; contiguous windows borrow).
    pub fn window(&self, start: usize, len: usize) -> Cow<'_, [Sample]> {
        let n = self.len;
        if n == 0 || len == 0 {
            return Cow::Borrowed(&[]);
        }
        let start = start % n;
        if start + len <= n {
            Cow::Borrowed(&self.data[start..start + len])
        } else if self.circular {
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                out.push(self.data[(start + i) % n]);
            }
            Cow::Owned(out)
        } else {
            Cow::Borrowed(&self.data[start..n])
        }
    }
}

enum PoolMsg {
    Buffer(SampleBuffer),
    Halt,
}

/// Returned by `acquire` on a pool that has been halted for shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHalted;

struct PoolState {
    allocated: usize,
    acquired: usize,
}

pub struct SampleBufferPool {
    params: PoolParams,
    state: Mutex<PoolState>,
    free: MessageQueue<PoolMsg>,
}

impl SampleBufferPool {
    pub fn new(params: PoolParams) -> Self {
        Self {
            params,
            state: Mutex::new(PoolState {
                allocated: 0,
                acquired: 0,
            }),
            free: MessageQueue::new(),
        }
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    /// `(allocated, acquired, free)` counts. At rest (no waiters),
    /// `acquired + free == allocated <= max_buffers`.
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().expect("pool mutex");
        (state.allocated, state.acquired, self.free.len())
    }

    fn try_fresh(&self) -> Option<SampleBuffer> {
        let mut state = self.state.lock().expect("pool mutex");
        if state.allocated < self.params.max_buffers {
            state.allocated += 1;
            state.acquired += 1;
            Some(SampleBuffer::new(
                self.params.alloc_size,
                self.params.vm_circularity,
            ))
        } else {
            None
        }
    }

    fn mark_acquired(&self) {
        self.state.lock().expect("pool mutex").acquired += 1;
    }

    /// Blocking acquire. Errs only when the pool was halted.
    pub fn acquire(&self) -> Result<SampleBuffer, PoolHalted> {
        if let Some(buffer) = self.free.poll() {
            return self.admit(buffer);
        }
        if let Some(fresh) = self.try_fresh() {
            return Ok(fresh);
        }
        let msg = self.free.read();
        self.admit(msg)
    }

    /// Non-blocking acquire.
    pub fn try_acquire(&self) -> Option<SampleBuffer> {
        if let Some(buffer) = self.free.poll() {
            return self.admit(buffer).ok();
        }
        self.try_fresh()
    }

    fn admit(&self, msg: PoolMsg) -> Result<SampleBuffer, PoolHalted> {
        match msg {
            PoolMsg::Buffer(buffer) => {
                self.mark_acquired();
                Ok(buffer)
            }
            PoolMsg::Halt => {
                // Keep waking the remaining waiters.
                self.free.write_urgent(PoolMsg::Halt);
                Err(PoolHalted)
            }
        }
    }

    /// Return a buffer to the pool, waking one waiter.
    pub fn give(&self, buffer: SampleBuffer) {
        self.state.lock().expect("pool mutex").acquired -= 1;
        self.free.write(PoolMsg::Buffer(buffer));
    }

    /// Poison the pool: every current and future waiter gets `PoolHalted`.
    pub fn halt(&self) {
        self.free.write_urgent(PoolMsg::Halt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn lazy_allocation_up_to_max() {
        let pool = SampleBufferPool::new(PoolParams {
            alloc_size: 64,
            max_buffers: 2,
            vm_circularity: false,
        });
        let a = pool.acquire().expect("first");
        let b = pool.acquire().expect("second");
        assert_eq!(pool.counts(), (2, 2, 0));
        assert!(pool.try_acquire().is_none(), "pool must be exhausted");

        pool.give(a);
        assert_eq!(pool.counts(), (2, 1, 1));
        let c = pool.try_acquire().expect("recycled");
        assert_eq!(c.capacity(), 64);
        pool.give(b);
        pool.give(c);
        let (allocated, acquired, free) = pool.counts();
        assert_eq!(acquired + free, allocated);
        assert!(allocated <= 2);
    }

    #[test]
    fn acquire_blocks_until_give() {
        let pool = Arc::new(SampleBufferPool::new(PoolParams {
            alloc_size: 16,
            max_buffers: 1,
            vm_circularity: false,
        }));
        let held = pool.acquire().expect("only buffer");

        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.acquire().map(|b| b.capacity()))
        };
        std::thread::sleep(Duration::from_millis(20));
        pool.give(held);
        assert_eq!(waiter.join().expect("waiter"), Ok(16));
    }

    #[test]
    fn halt_poisons_waiters() {
        let pool = Arc::new(SampleBufferPool::new(PoolParams {
            alloc_size: 16,
            max_buffers: 1,
            vm_circularity: false,
        }));
        let _held = pool.acquire().expect("only buffer");

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || pool.acquire().err())
            })
            .collect();
        std::thread::sleep(Duration::from_millis(20));
        pool.halt();
        for waiter in waiters {
            assert_eq!(waiter.join().expect("join"), Some(PoolHalted));
        }
    }

    #[test]
    fn circular_window_wraps() {
        let mut buffer = SampleBuffer::new(4, true);
        buffer.fill_from(&[
            Sample::new(0.0, 0.0),
            Sample::new(1.0, 0.0),
            Sample::new(2.0, 0.0),
            Sample::new(3.0, 0.0),
        ]);
        let window = buffer.window(3, 3);
        assert_eq!(window[0].re, 3.0);
        assert_eq!(window[1].re, 0.0);
        assert_eq!(window[2].re, 1.0);
    }

    #[test]
    fn linear_window_truncates() {
        let mut buffer = SampleBuffer::new(4, false);
        buffer.fill_from(&[Sample::new(0.0, 0.0); 4]);
        assert_eq!(buffer.window(2, 10).len(), 2);
    }
}
