// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The Local Analyzer: owns the source, detector, tuner, scheduler, the
//! worker threads and both message queues, and serializes every mutation
//! behind the documented lock order
//! `inspector_list → sched → loop → throttle` (hot-config and sweep
//! mutexes are leaves).

mod capture;
mod control;
mod inspmsg;
mod slow;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use radscan_core::config::{
    AnalyzerMode, AnalyzerParams, DetectorMode, DetectorParams, SpectrumPartitioning,
    SweepStrategy,
};
use radscan_core::msg::{
    AnalyzerEvent, ControlMsg, EosInfo, InspectorHandle, PsdFrame, WorkerId,
};
use radscan_core::source::{self, Permissions, Source, SourceConfig, SourceInfo};
use radscan_core::{Analyzer, Error, Result};

use radscan_dsp::{BasebandFilter, BasebandFilterChain, ChannelDetector};

use crate::inspector::InspectorState;
use crate::mq::MessageQueue;
use crate::pool::PoolParams;
use crate::sched::{InspectorScheduler, SchedState};
use crate::state::{AnalyzerState, StateCell};
use crate::sweep::{SweepParams, SweepState};
use crate::table::{acquire_overridable, InspectorTable};
use crate::throttle::Throttle;
use crate::worker::Worker;

/// Default capture read size in samples; grown to the source MTU when the
/// source can hand back more in one call.
pub(crate) const READ_SIZE: usize = 4096;

/// Full FFT windows to collect at one center before hopping (wide mode).
pub(crate) const MIN_POST_HOP_FFTS: usize = 4;

/// Transition-band proportion kept around inspector channels.
pub(crate) const GUARD_BAND_PROPORTION: f64 = 0.25;

/// Ceiling on scheduler workers; beyond this the barrier costs more than
/// the parallelism buys.
const MAX_SCHED_WORKERS: usize = 8;

/// State owned by the capture loop and guarded by the loop mutex.
pub(crate) struct CaptureLoop {
    pub detector: ChannelDetector,
    pub bbfilt: BasebandFilterChain,
    /// Seconds between CHANNEL updates.
    pub interval_channels: f64,
    /// Seconds between PSD frames.
    pub interval_psd: f64,
    pub last_psd: Instant,
    pub last_channels: Instant,
    pub psd_frames: u64,
    /// Center frequency of the current acquisition, Hz.
    pub center_freq_hz: f64,
}

pub(crate) struct Shared {
    pub mode: AnalyzerMode,
    pub realtime: bool,
    pub read_size: usize,
    pub source: Arc<dyn Source>,
    pub mq_in: Arc<MessageQueue<ControlMsg>>,
    pub mq_out: Arc<MessageQueue<AnalyzerEvent>>,
    pub state: StateCell,
    pub running: AtomicBool,
    pub loop_state: Mutex<CaptureLoop>,
    pub sched_state: Mutex<SchedState>,
    pub sched: InspectorScheduler,
    pub inspectors: Mutex<InspectorTable>,
    pub throttle: Mutex<Throttle>,
    pub hotconf: Mutex<slow::HotConf>,
    pub sweep: Mutex<SweepState>,
    pub source_wk: Mutex<Worker<ControlMsg>>,
    pub slow_wk: Mutex<Worker<ControlMsg>>,
    pub effective_samp_rate: AtomicU64,
    /// f64 bits of the smoothed measured rate.
    pub measured_samp_rate: AtomicU64,
    pub iq_reverse: AtomicBool,
    pub source_info: Mutex<SourceInfo>,
}

impl Shared {
    pub(crate) fn effective_samp_rate(&self) -> u64 {
        self.effective_samp_rate.load(Ordering::Acquire)
    }

    pub(crate) fn measured_samp_rate(&self) -> f64 {
        f64::from_bits(self.measured_samp_rate.load(Ordering::Acquire))
    }

    pub(crate) fn set_measured_samp_rate(&self, rate: f64) {
        self.measured_samp_rate
            .store(rate.to_bits(), Ordering::Release);
    }

    pub(crate) fn source_samp_rate(&self) -> u64 {
        self.source_info
            .lock()
            .expect("source info mutex")
            .effective_samp_rate
    }

    pub(crate) fn permissions(&self) -> Permissions {
        self.source_info
            .lock()
            .expect("source info mutex")
            .permissions
    }

    /// Snapshot of the source info with the live rate fields stamped in.
    pub(crate) fn info_snapshot(&self) -> SourceInfo {
        let mut info = self.source_info.lock().expect("source info mutex").clone();
        info.measured_samp_rate = self.measured_samp_rate();
        info.effective_samp_rate = self.effective_samp_rate();
        info
    }

    pub(crate) fn ack_halt(&self) {
        self.mq_out.write_urgent(AnalyzerEvent::Halt);
    }

    /// Consume the input queue until a HALT shows up, then acknowledge it.
    /// Runs when the control loop exits through an error path while the
    /// owner may still be waiting for the acknowledgement.
    pub(crate) fn wait_for_halt(&self) {
        loop {
            if let ControlMsg::Halt = self.mq_in.read() {
                self.ack_halt();
                return;
            }
        }
    }

    /// Replace detector parameters, recreating the instance only when an
    /// in-place update is impossible.
    pub(crate) fn readjust_detector(loop_state: &mut CaptureLoop, mut params: DetectorParams) {
        params.adjust();
        if !loop_state.detector.set_params(&params) {
            loop_state.detector = ChannelDetector::new(params);
        }
    }

    /// Build a PSD frame from the current detector state. Caller holds the
    /// loop mutex.
    pub(crate) fn psd_frame(&self, loop_state: &CaptureLoop) -> PsdFrame {
        PsdFrame {
            psd_db: loop_state.detector.psd_db(),
            n0_db: loop_state.detector.n0_db(),
            samp_rate: self.effective_samp_rate(),
            measured_samp_rate: self.measured_samp_rate(),
            center_freq_hz: loop_state.center_freq_hz,
            timestamp: self.source.get_time(),
            rt_timestamp: std::time::SystemTime::now(),
            flags: 0,
        }
    }

    /// Apply every pending overridable request to the tuner and emit the
    /// matching acknowledgements. Runs on the capture thread at the safe
    /// point before the cycle barrier; takes the inspector-list mutex and
    /// the sched lock in the documented order, never nested.
    pub(crate) fn drain_overridables(&self) {
        let drained = self
            .inspectors
            .lock()
            .expect("inspector list mutex")
            .drain_overrides();
        if drained.is_empty() {
            return;
        }

        let samp_rate = self.effective_samp_rate() as f64;
        let mut sched_state = self.sched_state.lock().expect("sched lock");
        for (entry, request) in drained {
            if entry.state() != InspectorState::Running {
                continue;
            }
            let Some(channel) = *entry.channel.lock().expect("inspector channel") else {
                continue;
            };

            if let Some(freq_hz) = request.freq_hz {
                let f0_norm = (freq_hz / samp_rate).clamp(-0.5, 0.5);
                if sched_state.tuner.set_channel_freq(channel, f0_norm) {
                    self.mq_out.write(AnalyzerEvent::Inspector(
                        radscan_core::msg::InspectorEvent::FrequencyChanged {
                            handle: entry.handle,
                            freq_hz,
                        },
                    ));
                }
            }
            if let Some(bw_hz) = request.bw_hz {
                let bw_norm = (bw_hz / samp_rate).clamp(1e-6, 1.0);
                if sched_state.tuner.set_channel_bandwidth(channel, bw_norm) {
                    self.mq_out.write(AnalyzerEvent::Inspector(
                        radscan_core::msg::InspectorEvent::BandwidthChanged {
                            handle: entry.handle,
                            bw_hz,
                        },
                    ));
                }
            }
        }
    }
}

/// The analyzer object handed to front-ends. Construction spawns the whole
/// thread roster; dropping it runs the full teardown sequence.
pub struct LocalAnalyzer {
    shared: Arc<Shared>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl LocalAnalyzer {
    pub fn new(config: &SourceConfig, params: AnalyzerParams) -> Result<Arc<Self>> {
        Self::with_source(source::open(config)?, params)
    }

    /// Build an analyzer over an already-opened source adapter.
    pub fn with_source(source: Arc<dyn Source>, params: AnalyzerParams) -> Result<Arc<Self>> {
        let info = source.info();
        let realtime = source.is_real_time();
        let read_size = READ_SIZE.max(info.mtu);

        let mq_in: Arc<MessageQueue<ControlMsg>> = Arc::new(MessageQueue::new());
        let mq_out: Arc<MessageQueue<AnalyzerEvent>> = Arc::new(MessageQueue::new());

        // Detector template, populated with source information.
        let mut det_params = params.detector.clone();
        det_params.mode = DetectorMode::Spectrum;
        det_params.samp_rate = info.source_samp_rate as f64;
        det_params.adjust();

        let source_wk = Worker::new("source-worker", mq_in.clone(), ControlMsg::WorkerHalted)
            .map_err(Error::ThreadSpawn)?;
        let slow_wk = Worker::new("slow-worker", mq_in.clone(), ControlMsg::WorkerHalted)
            .map_err(Error::ThreadSpawn)?;

        let num_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_SCHED_WORKERS);
        let sched = InspectorScheduler::new(
            num_workers,
            PoolParams {
                alloc_size: read_size,
                max_buffers: 4 * num_workers.max(4),
                vm_circularity: false,
            },
            mq_in.clone(),
        )
        .map_err(Error::ThreadSpawn)?;

        // Tuner window matches the detector's.
        let sched_state = SchedState::new(det_params.window_size);

        source.start()?;
        let info = source.info();

        // The hardware may have rejected the configured rate; follow the
        // effective one so get_samp_rate is accurate right after creation.
        let effective = info.effective_samp_rate.max(1);
        let mut detector_params = det_params.clone();
        if effective as f64 != detector_params.samp_rate {
            detector_params.samp_rate = effective as f64;
            detector_params.adjust();
        }
        let detector = ChannelDetector::new(detector_params.clone());

        let sweep_params = SweepParams {
            min_freq_hz: params.min_freq_hz,
            max_freq_hz: params.max_freq_hz,
            strategy: params.sweep_strategy,
            partitioning: params.partitioning,
            fft_min_samples: MIN_POST_HOP_FFTS * detector_params.window_size,
        };
        if params.mode == AnalyzerMode::WideSpectrum {
            let range = params.max_freq_hz - params.min_freq_hz;
            if range < effective as f64 {
                source.cancel();
                return Err(Error::Config(format!(
                    "wide-spectrum range {range} Hz narrower than one acquisition \
                     ({effective} sps)"
                )));
            }
        }

        let now = Instant::now();
        let shared = Arc::new(Shared {
            mode: params.mode,
            realtime,
            read_size,
            source,
            mq_in,
            mq_out,
            state: StateCell::new(),
            running: AtomicBool::new(false),
            loop_state: Mutex::new(CaptureLoop {
                detector,
                bbfilt: BasebandFilterChain::new(),
                interval_channels: params.channel_update_int,
                interval_psd: params.psd_update_int,
                last_psd: now,
                last_channels: now,
                psd_frames: 0,
                center_freq_hz: info.frequency_hz,
            }),
            sched_state: Mutex::new(sched_state),
            sched,
            inspectors: Mutex::new(InspectorTable::new()),
            throttle: Mutex::new(Throttle::new(effective)),
            hotconf: Mutex::new(slow::HotConf::default()),
            sweep: Mutex::new(SweepState::new(sweep_params)),
            source_wk: Mutex::new(source_wk),
            slow_wk: Mutex::new(slow_wk),
            effective_samp_rate: AtomicU64::new(effective),
            measured_samp_rate: AtomicU64::new((effective as f64).to_bits()),
            iq_reverse: AtomicBool::new(false),
            source_info: Mutex::new(info),
        });

        shared.state.advance(AnalyzerState::Starting);
        let control = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("analyzer-control".to_string())
                .spawn(move || control::control_thread(shared))
                .map_err(Error::ThreadSpawn)?
        };
        shared.running.store(true, Ordering::Release);

        Ok(Arc::new(Self {
            shared,
            control: Mutex::new(Some(control)),
        }))
    }

    /// Register a baseband filter ahead of the detector/tuner split.
    /// Channel mode only.
    pub fn register_baseband_filter(&self, filter: Box<dyn BasebandFilter>) -> bool {
        if self.shared.mode != AnalyzerMode::Channel {
            return false;
        }
        self.shared
            .loop_state
            .lock()
            .expect("loop mutex")
            .bbfilt
            .register(filter);
        true
    }

    pub fn num_sched_workers(&self) -> usize {
        self.shared.sched.num_workers()
    }

    pub fn analyzer_state(&self) -> AnalyzerState {
        self.shared.state.get()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Analyzer for LocalAnalyzer {
    fn set_frequency(&self, freq_hz: f64, lnb_hz: f64) -> bool {
        if !self.shared.permissions().contains(Permissions::SET_FREQ) {
            return false;
        }
        slow::submit(&self.shared, |s| s.freq_hz = Some(freq_hz - lnb_hz))
    }

    fn set_gain(&self, name: &str, db: f64) -> bool {
        if !self.shared.permissions().contains(Permissions::SET_GAIN) {
            return false;
        }
        let name = name.to_string();
        slow::submit(&self.shared, move |s| {
            s.gains.retain(|(n, _)| *n != name);
            s.gains.push((name, db));
        })
    }

    fn set_antenna(&self, name: &str) -> bool {
        if !self.shared.permissions().contains(Permissions::SET_ANTENNA) {
            return false;
        }
        let name = name.to_string();
        slow::submit(&self.shared, move |s| s.antenna = Some(name))
    }

    fn set_bandwidth(&self, bw_hz: f64) -> bool {
        if !self.shared.permissions().contains(Permissions::SET_BW) {
            return false;
        }
        slow::submit(&self.shared, move |s| s.bandwidth_hz = Some(bw_hz))
    }

    fn set_ppm(&self, ppm: f64) -> bool {
        if !self.shared.permissions().contains(Permissions::SET_PPM) {
            return false;
        }
        slow::submit(&self.shared, move |s| s.ppm = Some(ppm))
    }

    fn set_dc_remove(&self, enabled: bool) -> bool {
        if !self
            .shared
            .permissions()
            .contains(Permissions::SET_DC_REMOVE)
        {
            return false;
        }
        slow::submit(&self.shared, move |s| s.dc_remove = Some(enabled))
    }

    fn set_agc(&self, enabled: bool) -> bool {
        if !self.shared.permissions().contains(Permissions::SET_AGC) {
            return false;
        }
        slow::submit(&self.shared, move |s| s.agc = Some(enabled))
    }

    fn set_iq_reverse(&self, enabled: bool) -> bool {
        self.shared.iq_reverse.store(enabled, Ordering::Release);
        true
    }

    fn set_sweep_strategy(&self, strategy: SweepStrategy) -> bool {
        if self.shared.mode != AnalyzerMode::WideSpectrum {
            return false;
        }
        self.shared
            .sweep
            .lock()
            .expect("sweep mutex")
            .stage(|p| p.strategy = strategy);
        true
    }

    fn set_spectrum_partitioning(&self, partitioning: SpectrumPartitioning) -> bool {
        if self.shared.mode != AnalyzerMode::WideSpectrum {
            return false;
        }
        self.shared
            .sweep
            .lock()
            .expect("sweep mutex")
            .stage(|p| p.partitioning = partitioning);
        true
    }

    fn set_hop_range(&self, min_hz: f64, max_hz: f64) -> bool {
        if self.shared.mode != AnalyzerMode::WideSpectrum || max_hz < min_hz {
            return false;
        }
        self.shared.sweep.lock().expect("sweep mutex").stage(|p| {
            p.min_freq_hz = min_hz;
            p.max_freq_hz = max_hz;
        });
        true
    }

    fn set_buffering_size(&self, samples: usize) -> bool {
        if self.shared.mode != AnalyzerMode::WideSpectrum || samples == 0 {
            return false;
        }
        self.shared
            .sweep
            .lock()
            .expect("sweep mutex")
            .stage(|p| p.fft_min_samples = samples);
        true
    }

    fn set_inspector_frequency(&self, handle: InspectorHandle, freq_hz: f64) -> bool {
        match acquire_overridable(&self.shared.inspectors, handle) {
            Some(mut guard) => {
                guard.freq_hz = Some(freq_hz);
                true
            }
            None => false,
        }
    }

    fn set_inspector_bandwidth(&self, handle: InspectorHandle, bw_hz: f64) -> bool {
        match acquire_overridable(&self.shared.inspectors, handle) {
            Some(mut guard) => {
                guard.bw_hz = Some(bw_hz);
                true
            }
            None => false,
        }
    }

    fn force_eos(&self) -> bool {
        self.shared.source.cancel();
        true
    }

    fn is_real_time(&self) -> bool {
        self.shared.realtime
    }

    fn get_samp_rate(&self) -> u64 {
        self.shared.effective_samp_rate()
    }

    fn get_measured_samp_rate(&self) -> f64 {
        self.shared.measured_samp_rate()
    }

    fn get_source_info(&self) -> SourceInfo {
        self.shared.info_snapshot()
    }

    fn commit_source_info(&self) -> bool {
        let info = self.shared.info_snapshot();
        self.shared.mq_out.write(AnalyzerEvent::SourceInfo(info));
        true
    }

    fn write(&self, msg: ControlMsg) -> bool {
        if !self.shared.running.load(Ordering::Acquire) {
            return false;
        }
        self.shared.mq_in.write(msg);
        true
    }

    fn req_halt(&self) {
        self.shared.mq_in.write_urgent(ControlMsg::Halt);
    }

    fn read(&self) -> AnalyzerEvent {
        self.shared.mq_out.read()
    }

    fn poll(&self) -> Option<AnalyzerEvent> {
        self.shared.mq_out.poll()
    }
}

impl Drop for LocalAnalyzer {
    fn drop(&mut self) {
        let shared = &self.shared;
        shared.state.advance(AnalyzerState::Stopping);

        // Keep the source from sitting in timeout loops, then let the
        // control thread observe the halt and wind down.
        shared.source.cancel();
        shared.mq_in.write_urgent(ControlMsg::Halt);
        if let Some(handle) = self.control.lock().expect("control handle").take() {
            if handle.join().is_err() {
                tracing::error!("control thread panicked during teardown");
            }
        }

        // Halt the source and slow workers and wait for both
        // acknowledgements on the input queue; anything else read along the
        // way is stale and simply dropped.
        shared.source_wk.lock().expect("source worker").req_halt();
        shared.slow_wk.lock().expect("slow worker").req_halt();
        let mut pending: Vec<WorkerId> = vec![
            shared.source_wk.lock().expect("source worker").id(),
            shared.slow_wk.lock().expect("slow worker").id(),
        ];
        while !pending.is_empty() {
            if let ControlMsg::WorkerHalted(id) = shared.mq_in.read() {
                pending.retain(|p| *p != id);
            }
        }
        if !shared.source_wk.lock().expect("source worker").destroy() {
            tracing::error!("source worker destruction failed");
        }
        if !shared.slow_wk.lock().expect("slow worker").destroy() {
            tracing::error!("slow worker destruction failed");
        }

        // Scheduler workers next; their acknowledgements are consumed with
        // the rest of the input queue below.
        if !shared.sched.destroy() {
            tracing::error!("inspector scheduler shutdown failed");
        }

        // Free pending overridable requests and unbind what is left,
        // returning any undelivered channel data to the pool.
        shared
            .inspectors
            .lock()
            .expect("inspector list mutex")
            .drain_overrides();
        {
            let mut sched_state = shared.sched_state.lock().expect("sched lock");
            for task in sched_state.tasks.values() {
                task.reclaim(shared.sched.pool());
            }
            sched_state.tasks.clear();
        }
        for entry in shared
            .inspectors
            .lock()
            .expect("inspector list mutex")
            .entries()
        {
            entry.set_state(InspectorState::Halted);
        }

        // Consume whatever is still queued.
        while shared.mq_in.poll().is_some() {}

        shared.state.advance(AnalyzerState::Stopped);
    }
}

// Re-exported for the control submodule.
pub(crate) use capture::{ChannelCaptureTask, WideCaptureTask};

#[cfg(test)]
mod tests;

/// Emit an EOS control message; helper shared by the capture tasks.
pub(crate) fn post_eos(mq: &Arc<MessageQueue<ControlMsg>>, detail: Option<String>) {
    mq.write(ControlMsg::Eos(EosInfo { detail }));
}
