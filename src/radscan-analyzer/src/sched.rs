// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Inspector scheduler: a fixed pool of worker threads that run inspectors
//! over detached channel output, joined by a barrier once per capture
//! cycle.
//!
//! Extracted channel data is copied into pool buffers at queue time (the
//! tuner's slices die with the feed call); the pool bound is what
//! back-pressures a producer that outruns the inspectors. The barrier width
//! is `workers + 1` for the analyzer's lifetime; the extra participant is
//! the source worker calling [`InspectorScheduler::sync`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use radscan_core::msg::{AnalyzerEvent, ControlMsg, InspectorEvent};
use radscan_core::Sample;
use radscan_dsp::{SpectralTuner, TunerChannelId};

use crate::inspector::InspectorState;
use crate::mq::MessageQueue;
use crate::pool::{PoolParams, SampleBuffer, SampleBufferPool};
use crate::table::InspectorEntry;
use crate::worker::{TaskStatus, Worker, WorkerTask};

/// Binds one tuner channel to one inspector. The queue carries channel
/// data from the capture thread to whichever worker picks the task up.
pub struct TaskInfo {
    pub entry: Arc<InspectorEntry>,
    pub channel: TunerChannelId,
    queue: MessageQueue<SampleBuffer>,
}

impl TaskInfo {
    pub fn new(entry: Arc<InspectorEntry>, channel: TunerChannelId) -> Self {
        Self {
            entry,
            channel,
            queue: MessageQueue::new(),
        }
    }

    /// Return every undelivered buffer to the pool. Teardown only: feeds
    /// that were queued but never ran leave their buffers here.
    pub fn reclaim(&self, pool: &SampleBufferPool) -> usize {
        let mut reclaimed = 0;
        while let Some(buffer) = self.queue.poll() {
            pool.give(buffer);
            reclaimed += 1;
        }
        reclaimed
    }
}

/// Everything the sched lock protects: the tuner and the channel→task
/// binding table.
pub struct SchedState {
    pub tuner: SpectralTuner,
    pub tasks: HashMap<TunerChannelId, Arc<TaskInfo>>,
}

impl SchedState {
    pub fn new(tuner_window: usize) -> Self {
        Self {
            tuner: SpectralTuner::new(tuner_window),
            tasks: HashMap::new(),
        }
    }
}

pub struct InspectorScheduler {
    workers: std::sync::Mutex<Vec<Worker<ControlMsg>>>,
    num_workers: usize,
    barrier: Arc<Barrier>,
    pool: Arc<SampleBufferPool>,
    rr: AtomicUsize,
}

impl InspectorScheduler {
    pub fn new(
        num_workers: usize,
        pool_params: PoolParams,
        mq_ack: Arc<MessageQueue<ControlMsg>>,
    ) -> std::io::Result<Self> {
        let num_workers = num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            workers.push(Worker::new(
                &format!("insp-worker-{i}"),
                mq_ack.clone(),
                ControlMsg::WorkerHalted,
            )?);
        }

        Ok(Self {
            workers: std::sync::Mutex::new(workers),
            num_workers,
            // Width counts the scheduler workers plus the source worker.
            barrier: Arc::new(Barrier::new(num_workers + 1)),
            pool: Arc::new(SampleBufferPool::new(pool_params)),
            rr: AtomicUsize::new(0),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn pool(&self) -> &Arc<SampleBufferPool> {
        &self.pool
    }

    /// Deliver one block of channel data to `task` and dispatch a feed to
    /// the next worker in round-robin order. Returns `false` once the pool
    /// has been halted for shutdown.
    pub fn queue(
        &self,
        task: &Arc<TaskInfo>,
        data: &[Sample],
        events: &Arc<MessageQueue<AnalyzerEvent>>,
    ) -> bool {
        for chunk in data.chunks(self.pool.params().alloc_size) {
            let Ok(mut buffer) = self.pool.acquire() else {
                return false;
            };
            buffer.fill_from(chunk);
            task.queue.write(buffer);

            let workers = self.workers.lock().expect("sched workers mutex");
            let slot = self.rr.fetch_add(1, Ordering::Relaxed) % workers.len();
            let dispatched = workers[slot].push_task(FeedTask {
                task: task.clone(),
                events: events.clone(),
                pool: self.pool.clone(),
            });
            if !dispatched {
                return false;
            }
        }
        true
    }

    /// End-of-cycle rendezvous: every worker joins the barrier after
    /// draining the feeds queued this cycle, and so does the caller.
    pub fn sync(&self) {
        {
            let workers = self.workers.lock().expect("sched workers mutex");
            for worker in workers.iter() {
                worker.push_task(BarrierTask {
                    barrier: self.barrier.clone(),
                });
            }
        }
        self.barrier.wait();
    }

    /// Halt every worker and poison the pool. Halt acknowledgements land on
    /// the ack queue passed at construction.
    pub fn destroy(&self) -> bool {
        self.pool.halt();
        let mut workers = self.workers.lock().expect("sched workers mutex");
        for worker in workers.iter() {
            worker.req_halt();
        }
        let mut ok = true;
        for worker in workers.iter_mut() {
            ok &= worker.destroy();
        }
        ok
    }
}

struct FeedTask {
    task: Arc<TaskInfo>,
    events: Arc<MessageQueue<AnalyzerEvent>>,
    pool: Arc<SampleBufferPool>,
}

impl WorkerTask<ControlMsg> for FeedTask {
    fn run(&mut self, _mq_out: &Arc<MessageQueue<ControlMsg>>) -> TaskStatus {
        let Some(buffer) = self.task.queue.poll() else {
            return TaskStatus::Done;
        };

        // A non-running inspector is not fed; its channel unbinds at the
        // next queue attempt on the capture thread.
        if self.task.entry.state() == InspectorState::Running {
            let handle = self.task.entry.handle;
            let mut inspector = self.task.entry.inner.lock().expect("inspector mutex");
            inspector.feed(buffer.data(), &mut |name, value| {
                self.events.write(AnalyzerEvent::Inspector(InspectorEvent::Signal {
                    handle,
                    name,
                    value,
                }));
            });
        }

        self.pool.give(buffer);
        TaskStatus::Done
    }
}

struct BarrierTask {
    barrier: Arc<Barrier>,
}

impl WorkerTask<ControlMsg> for BarrierTask {
    fn run(&mut self, _mq_out: &Arc<MessageQueue<ControlMsg>>) -> TaskStatus {
        self.barrier.wait();
        TaskStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::{make_inspector, InspectorContext};
    use radscan_dsp::TunerChannelParams;

    fn running_entry(handle: usize) -> Arc<InspectorEntry> {
        let ctx = InspectorContext {
            channel_samp_rate: 1000.0,
            bw_hz: 100.0,
            pcm: None,
        };
        let entry = Arc::new(InspectorEntry::new(
            handle,
            "power",
            1000.0,
            make_inspector("power", &ctx).expect("power class"),
        ));
        entry.set_state(InspectorState::Running);
        entry
    }

    fn scheduler(workers: usize) -> (InspectorScheduler, Arc<MessageQueue<ControlMsg>>) {
        let mq_ack = Arc::new(MessageQueue::new());
        let sched = InspectorScheduler::new(
            workers,
            PoolParams {
                alloc_size: 1024,
                max_buffers: 8,
                vm_circularity: false,
            },
            mq_ack.clone(),
        )
        .expect("scheduler");
        (sched, mq_ack)
    }

    #[test]
    fn feeds_inspector_and_reports_signals() {
        let (sched, _ack) = scheduler(2);
        let events = Arc::new(MessageQueue::new());

        let mut state = SchedState::new(1024);
        let channel = state.tuner.open_channel(TunerChannelParams {
            f0_norm: 0.0,
            bw_norm: 0.5,
            guard: 0.0,
            precise: false,
        });
        let task = Arc::new(TaskInfo::new(running_entry(0), channel));

        // 100 unit-power samples trip the power inspector's default 0.1 s
        // reporting interval at 1 ksps.
        let block = vec![Sample::new(1.0, 0.0); 100];
        assert!(sched.queue(&task, &block, &events));
        sched.sync();

        match events.poll().expect("signal event") {
            AnalyzerEvent::Inspector(InspectorEvent::Signal {
                handle,
                name,
                value,
            }) => {
                assert_eq!(handle, 0);
                assert_eq!(name, "power");
                assert!(value.abs() < 0.1, "power level {value}");
            }
            _ => panic!("unexpected event"),
        }

        assert!(sched.destroy());
        let (_, acquired, _) = sched.pool().counts();
        assert_eq!(acquired, 0, "buffers leaked");
    }

    #[test]
    fn halted_inspector_is_not_fed() {
        let (sched, _ack) = scheduler(1);
        let events = Arc::new(MessageQueue::new());

        let mut state = SchedState::new(512);
        let channel = state.tuner.open_channel(TunerChannelParams {
            f0_norm: 0.0,
            bw_norm: 0.5,
            guard: 0.0,
            precise: false,
        });
        let entry = running_entry(0);
        entry.set_state(InspectorState::Halted);
        let task = Arc::new(TaskInfo::new(entry, channel));

        let block = vec![Sample::new(1.0, 0.0); 200];
        assert!(sched.queue(&task, &block, &events));
        sched.sync();
        assert!(events.poll().is_none(), "halted inspector produced events");
        assert!(sched.destroy());
    }

    #[test]
    fn sync_joins_all_workers_every_cycle() {
        let (sched, _ack) = scheduler(3);
        assert_eq!(sched.num_workers(), 3);
        for _ in 0..50 {
            sched.sync();
        }
        assert!(sched.destroy());
    }

    #[test]
    fn oversized_blocks_split_across_buffers() {
        let (sched, _ack) = scheduler(2);
        let events = Arc::new(MessageQueue::new());
        let mut state = SchedState::new(512);
        let channel = state.tuner.open_channel(TunerChannelParams {
            f0_norm: 0.0,
            bw_norm: 0.5,
            guard: 0.0,
            precise: false,
        });
        let task = Arc::new(TaskInfo::new(running_entry(0), channel));

        // 4096 samples through 1024-sample buffers: four chunks, all
        // returned to the pool after the cycle.
        let block = vec![Sample::new(0.5, 0.0); 4096];
        assert!(sched.queue(&task, &block, &events));
        sched.sync();
        let (_, acquired, _) = sched.pool().counts();
        assert_eq!(acquired, 0);
        assert!(sched.destroy());
    }
}
