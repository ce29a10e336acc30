// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Single-thread callback consumer driven by a message queue.
//!
//! A worker is a way to delegate expensive work to another thread; the
//! objects the tasks operate on do not belong to it. A task whose `run`
//! returns [`TaskStatus::Continue`] is re-enqueued on the worker's own
//! input queue (a self-driven tick); `Done` destroys it. An urgent HALT
//! preempts pending ticks, is acknowledged on the out-queue and stops the
//! thread.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use radscan_core::msg::WorkerId;

use crate::mq::MessageQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Re-enqueue this task on the worker's input queue.
    Continue,
    /// The task is finished; destroy it.
    Done,
}

/// A unit of work executed on a worker thread. `mq_out` is the worker's
/// out-queue (for the analyzer's workers, the analyzer input queue).
pub trait WorkerTask<Q: Send + 'static>: Send {
    fn run(&mut self, mq_out: &Arc<MessageQueue<Q>>) -> TaskStatus;
}

enum WorkerMsg<Q: Send + 'static> {
    Callback(Box<dyn WorkerTask<Q>>),
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    Halted = 2,
}

fn state_from_u8(v: u8) -> WorkerState {
    match v {
        1 => WorkerState::Running,
        2 => WorkerState::Halted,
        _ => WorkerState::Created,
    }
}

static NEXT_WORKER_ID: AtomicU32 = AtomicU32::new(0);

pub struct Worker<Q: Send + 'static> {
    id: WorkerId,
    name: String,
    mq_in: Arc<MessageQueue<WorkerMsg<Q>>>,
    state: Arc<AtomicU8>,
    halt_requested: AtomicBool,
    thread: Option<JoinHandle<()>>,
}

impl<Q: Send + 'static> Worker<Q> {
    /// Spawn a worker. `halt_ack` builds the message written urgently to
    /// `mq_out` when the HALT is processed.
    pub fn new(
        name: &str,
        mq_out: Arc<MessageQueue<Q>>,
        halt_ack: impl FnOnce(WorkerId) -> Q + Send + 'static,
    ) -> std::io::Result<Self> {
        let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
        let mq_in: Arc<MessageQueue<WorkerMsg<Q>>> = Arc::new(MessageQueue::new());
        let state = Arc::new(AtomicU8::new(WorkerState::Created as u8));

        let thread = {
            let mq_in = mq_in.clone();
            let state = state.clone();
            std::thread::Builder::new()
                .name(name.to_string())
                .spawn(move || worker_thread(id, mq_in, mq_out, state, halt_ack))?
        };

        let worker = Self {
            id,
            name: name.to_string(),
            mq_in,
            state,
            halt_requested: AtomicBool::new(false),
            thread: Some(thread),
        };
        worker
            .state
            .store(WorkerState::Running as u8, Ordering::Release);
        Ok(worker)
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    /// Enqueue a task. Refused once the worker is halted.
    pub fn push(&self, task: Box<dyn WorkerTask<Q>>) -> bool {
        if self.state() != WorkerState::Running {
            return false;
        }
        self.mq_in.write(WorkerMsg::Callback(task));
        true
    }

    pub fn push_task<T: WorkerTask<Q> + 'static>(&self, task: T) -> bool {
        self.push(Box::new(task))
    }

    /// Post an urgent HALT. The worker acknowledges on its out-queue.
    pub fn req_halt(&self) {
        self.halt_requested.store(true, Ordering::Release);
        self.mq_in.write_urgent(WorkerMsg::Halt);
    }

    /// Join the thread and free all pending callbacks. Destroying a worker
    /// that was never halted is a caller bug; it is reported and refused,
    /// leaking the thread.
    pub fn destroy(&mut self) -> bool {
        if !self.halt_requested.load(Ordering::Acquire) {
            tracing::error!("cannot destroy worker `{}': still running", self.name);
            return false;
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("worker `{}' thread panicked", self.name);
                return false;
            }
        }

        // Thread stopped; pop all messages and release the callbacks.
        while self.mq_in.poll().is_some() {}
        true
    }
}

impl<Q: Send + 'static> Drop for Worker<Q> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if !self.halt_requested.load(Ordering::Acquire) {
                tracing::error!("worker `{}' dropped while running", self.name);
                self.req_halt();
            }
            self.destroy();
        }
    }
}

fn worker_thread<Q: Send + 'static>(
    id: WorkerId,
    mq_in: Arc<MessageQueue<WorkerMsg<Q>>>,
    mq_out: Arc<MessageQueue<Q>>,
    state: Arc<AtomicU8>,
    halt_ack: impl FnOnce(WorkerId) -> Q,
) {
    let mut halt_ack = Some(halt_ack);
    loop {
        // First read blocks; then drain until the queue is empty.
        let mut msg = mq_in.read();
        loop {
            match msg {
                WorkerMsg::Callback(mut task) => {
                    if task.run(&mq_out) == TaskStatus::Continue {
                        mq_in.write(WorkerMsg::Callback(task));
                    }
                }
                WorkerMsg::Halt => {
                    state.store(WorkerState::Halted as u8, Ordering::Release);
                    if let Some(ack) = halt_ack.take() {
                        mq_out.write_urgent(ack(id));
                    }
                    return;
                }
            }
            match mq_in.poll() {
                Some(next) => msg = next,
                None => break,
            }
        }
    }
}
