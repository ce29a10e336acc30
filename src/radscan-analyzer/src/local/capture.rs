// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Capture callbacks run by the source worker.
//!
//! Both modes share one cycle shape: read (throttle-gated for non-realtime
//! sources), run the baseband chain, split between detector and tuner, fan
//! extracted channels out to the scheduler, apply pending inspector
//! overrides, and join the cycle barrier. Wide mode additionally retunes
//! the source along the sweep plan once enough samples were collected at
//! the current center.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use radscan_core::msg::{AnalyzerEvent, ChannelUpdate, ControlMsg};
use radscan_core::{Sample, SourceError};

use crate::inspector::InspectorState;
use crate::mq::MessageQueue;
use crate::sched::SchedState;
use crate::sweep::SweepPlanner;
use crate::worker::{TaskStatus, WorkerTask};

use super::{post_eos, Shared};

/// Measured-rate EMA update period.
const RATE_WINDOW: Duration = Duration::from_millis(250);

/// EMA coefficient for the measured sample rate.
const RATE_ALPHA: f64 = 0.25;

/// Shared per-cycle plumbing for both capture modes.
struct CaptureCycle {
    shared: Arc<Shared>,
    buf: Vec<Sample>,
    rate_window_start: Instant,
    rate_samples: u64,
}

enum CycleOutcome {
    Processed(usize),
    Idle,
    Eos,
}

impl CaptureCycle {
    fn new(shared: Arc<Shared>) -> Self {
        let read_size = shared.read_size;
        Self {
            shared,
            buf: vec![Sample::new(0.0, 0.0); read_size],
            rate_window_start: Instant::now(),
            rate_samples: 0,
        }
    }

    fn account_rate(&mut self, n: usize) {
        self.rate_samples += n as u64;
        let elapsed = self.rate_window_start.elapsed();
        if elapsed < RATE_WINDOW {
            return;
        }
        let instantaneous = self.rate_samples as f64 / elapsed.as_secs_f64();
        let previous = self.shared.measured_samp_rate();
        let smoothed = if previous <= 0.0 {
            instantaneous
        } else {
            previous + RATE_ALPHA * (instantaneous - previous)
        };
        self.shared.set_measured_samp_rate(smoothed);
        self.rate_samples = 0;
        self.rate_window_start = Instant::now();
    }

    /// One read-and-analyze pass. Emits PSD/CHANNEL at their cadences and
    /// fans extracted channels out to the scheduler, but does not join the
    /// barrier; the mode-specific callback does that after its own work.
    fn acquire_and_process(&mut self, mq: &Arc<MessageQueue<ControlMsg>>) -> CycleOutcome {
        let shared = self.shared.clone();

        let max = self.buf.len();
        let allowed = if shared.realtime {
            max
        } else {
            shared.throttle.lock().expect("throttle mutex").advise(max)
        };
        if allowed == 0 {
            std::thread::sleep(Duration::from_millis(1));
            return CycleOutcome::Idle;
        }

        let n = match shared.source.read(&mut self.buf[..allowed]) {
            Ok(n) => n,
            Err(error) if error.is_retryable() => return CycleOutcome::Idle,
            Err(SourceError::Eos) => {
                post_eos(mq, None);
                return CycleOutcome::Eos;
            }
            Err(error) => {
                tracing::error!("source read failed: {}", error);
                post_eos(mq, Some(error.to_string()));
                return CycleOutcome::Eos;
            }
        };

        if !shared.realtime {
            shared
                .throttle
                .lock()
                .expect("throttle mutex")
                .advance(n);
        }
        self.account_rate(n);

        let samples = &mut self.buf[..n];
        if shared.iq_reverse.load(Ordering::Acquire) {
            for s in samples.iter_mut() {
                *s = s.conj();
            }
        }

        {
            let mut loop_state = shared.loop_state.lock().expect("loop mutex");
            loop_state.bbfilt.run(samples);
            loop_state.detector.feed_bulk(samples);

            let now = Instant::now();
            if loop_state.detector.iters() > 0 {
                if now.duration_since(loop_state.last_psd).as_secs_f64()
                    >= loop_state.interval_psd
                {
                    loop_state.last_psd = now;
                    loop_state.psd_frames += 1;
                    let frame = shared.psd_frame(&loop_state);
                    shared.mq_out.write(AnalyzerEvent::Psd(frame));
                }
                if now.duration_since(loop_state.last_channels).as_secs_f64()
                    >= loop_state.interval_channels
                {
                    loop_state.last_channels = now;
                    let channels = loop_state.detector.channels();
                    mq.write(ControlMsg::Channel(ChannelUpdate { channels }));
                }
            }
        }

        fan_out(&shared, samples);
        shared.drain_overridables();

        CycleOutcome::Processed(n)
    }
}

/// Deliver the block to every open tuner channel. A channel whose
/// inspector left the RUNNING state is unbound and closed here, inside the
/// sched lock.
fn fan_out(shared: &Shared, samples: &[Sample]) {
    let mut sched_state = shared.sched_state.lock().expect("sched lock");
    let SchedState { tuner, tasks } = &mut *sched_state;
    let sched = &shared.sched;
    let events = &shared.mq_out;

    tuner.feed(samples, &mut |channel, data| {
        let Some(task) = tasks.get(&channel).cloned() else {
            return false;
        };
        if task.entry.state() != InspectorState::Running {
            tasks.remove(&channel);
            task.reclaim(sched.pool());
            return false;
        }
        sched.queue(&task, data, events)
    });
}

/// Channel-mode capture callback.
pub(crate) struct ChannelCaptureTask {
    cycle: CaptureCycle,
}

impl ChannelCaptureTask {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            cycle: CaptureCycle::new(shared),
        }
    }
}

impl WorkerTask<ControlMsg> for ChannelCaptureTask {
    fn run(&mut self, mq: &Arc<MessageQueue<ControlMsg>>) -> TaskStatus {
        match self.cycle.acquire_and_process(mq) {
            CycleOutcome::Processed(_) => {
                self.cycle.shared.sched.sync();
                TaskStatus::Continue
            }
            CycleOutcome::Idle => TaskStatus::Continue,
            CycleOutcome::Eos => TaskStatus::Done,
        }
    }
}

/// Wide-spectrum capture callback: channel-mode analysis plus sweep
/// retuning at hop boundaries.
pub(crate) struct WideCaptureTask {
    cycle: CaptureCycle,
    planner: SweepPlanner,
    fft_min_samples: usize,
    hop_collected: usize,
    hopped_once: bool,
}

impl WideCaptureTask {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let (params, samp_rate) = {
            let sweep = shared.sweep.lock().expect("sweep mutex");
            (sweep.current, shared.effective_samp_rate() as f64)
        };
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self {
            fft_min_samples: params.fft_min_samples.max(1),
            planner: SweepPlanner::new(params, samp_rate, seed),
            cycle: CaptureCycle::new(shared),
            hop_collected: 0,
            hopped_once: false,
        }
    }

    fn hop(&mut self, shared: &Arc<Shared>) {
        // Flush the spectrum collected at the current center before the
        // retune invalidates it.
        {
            let mut loop_state = shared.loop_state.lock().expect("loop mutex");
            if loop_state.detector.iters() > 0 {
                loop_state.psd_frames += 1;
                let frame = shared.psd_frame(&loop_state);
                shared.mq_out.write(AnalyzerEvent::Psd(frame));
            }
            loop_state.detector.reset();
        }

        // Sweep-plan swaps happen exactly at hop boundaries.
        {
            let mut sweep = shared.sweep.lock().expect("sweep mutex");
            if let Some(published) = sweep.publish() {
                self.planner
                    .reconfigure(published, shared.effective_samp_rate() as f64);
                self.fft_min_samples = published.fft_min_samples.max(1);
            }
        }

        let center = self.planner.next_center();
        match shared.source.set_frequency(center) {
            Ok(()) => {
                shared
                    .loop_state
                    .lock()
                    .expect("loop mutex")
                    .center_freq_hz = center;
                self.hopped_once = true;
            }
            Err(error) => {
                tracing::warn!("sweep retune to {:.0} Hz failed: {}", center, error);
            }
        }
        self.hop_collected = 0;
    }
}

impl WorkerTask<ControlMsg> for WideCaptureTask {
    fn run(&mut self, mq: &Arc<MessageQueue<ControlMsg>>) -> TaskStatus {
        // Seed the sweep on the very first cycle so the analyzer does not
        // linger at the configured center outside the hop range.
        if !self.hopped_once {
            let shared = self.cycle.shared.clone();
            self.hop(&shared);
        }

        match self.cycle.acquire_and_process(mq) {
            CycleOutcome::Processed(n) => {
                self.hop_collected += n;
                if self.hop_collected >= self.fft_min_samples {
                    let shared = self.cycle.shared.clone();
                    self.hop(&shared);
                }
                self.cycle.shared.sched.sync();
                TaskStatus::Continue
            }
            CycleOutcome::Idle => TaskStatus::Continue,
            CycleOutcome::Eos => TaskStatus::Done,
        }
    }
}
