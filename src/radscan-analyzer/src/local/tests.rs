// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f32::consts::TAU;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use radscan_core::config::{
    AnalyzerMode, AnalyzerParams, SpectrumPartitioning, SweepStrategy,
};
use radscan_core::msg::{
    AnalyzerEvent, ControlMsg, InitStatus, InspectorEvent, InspectorRequest,
    InspectorRequestKind, ThrottleRequest,
};
use radscan_core::source::{FileFormat, Permissions, Source, SourceConfig, SourceInfo, SourceKind};
use radscan_core::{Analyzer, Sample, SourceError};

use crate::state::AnalyzerState;

use super::LocalAnalyzer;

const WAIT: Duration = Duration::from_secs(10);

fn wait_event(
    analyzer: &Arc<LocalAnalyzer>,
    mut pred: impl FnMut(&AnalyzerEvent) -> bool,
) -> AnalyzerEvent {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(event) = analyzer.poll() {
            if pred(&event) {
                return event;
            }
            continue;
        }
        assert!(Instant::now() < deadline, "timed out waiting for event");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn silence_analyzer(samp_rate: u64) -> Arc<LocalAnalyzer> {
    let config = SourceConfig {
        samp_rate,
        ..Default::default()
    };
    let analyzer = LocalAnalyzer::new(&config, AnalyzerParams::default()).expect("analyzer");
    wait_event(&analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::SourceInit {
                status: InitStatus::Success,
                ..
            }
        )
    });
    analyzer
}

fn open_inspector(analyzer: &Arc<LocalAnalyzer>, class: &str, fc_hz: f64, bw_hz: f64) -> usize {
    assert!(analyzer.write(ControlMsg::Inspector(InspectorRequest {
        request_id: 1,
        kind: InspectorRequestKind::Open {
            class: class.to_string(),
            fc_hz,
            bw_hz,
            precise: false,
            pcm: None,
        },
    })));
    match wait_event(analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::Inspector(InspectorEvent::Opened { .. })
                | AnalyzerEvent::Inspector(InspectorEvent::Error { .. })
        )
    }) {
        AnalyzerEvent::Inspector(InspectorEvent::Opened { handle, .. }) => handle,
        AnalyzerEvent::Inspector(InspectorEvent::Error { detail, .. }) => {
            panic!("open failed: {detail}")
        }
        _ => unreachable!(),
    }
}

#[test]
fn startup_reports_source_init_and_reaches_running() {
    let analyzer = silence_analyzer(1_000_000);
    assert_eq!(analyzer.analyzer_state(), AnalyzerState::Running);
    assert!(!analyzer.is_real_time());
    assert_eq!(analyzer.get_samp_rate(), 1_000_000);
    drop(analyzer);
}

#[test]
fn teardown_without_prior_halt_terminates() {
    // The dtor posts the urgent HALT itself and must come back with every
    // thread joined.
    let analyzer = silence_analyzer(500_000);
    let t0 = Instant::now();
    drop(analyzer);
    assert!(
        t0.elapsed() < Duration::from_secs(5),
        "teardown took {:?}",
        t0.elapsed()
    );
}

#[test]
fn halt_request_is_acknowledged() {
    let analyzer = silence_analyzer(500_000);
    analyzer.req_halt();
    wait_event(&analyzer, |e| matches!(e, AnalyzerEvent::Halt));
}

#[test]
fn file_tone_yields_nonempty_channel_update() {
    // A strong tone at +100 kHz over a 1 Msps recording must show up in
    // the first CHANNEL update, with a finite noise floor below the peak.
    let mut path = std::env::temp_dir();
    path.push(format!("radscan-chan-{}.cf32", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).expect("create recording");
        let mut noise_state = 0x9E3779B97F4A7C15u64;
        let mut noise = move || {
            noise_state ^= noise_state << 13;
            noise_state ^= noise_state >> 7;
            noise_state ^= noise_state << 17;
            (noise_state >> 40) as f32 / (1u64 << 24) as f32 - 0.5
        };
        for n in 0..600_000usize {
            let s = Sample::from_polar(1.0, TAU * 0.1 * n as f32)
                + Sample::new(0.02 * noise(), 0.02 * noise());
            file.write_all(&s.re.to_le_bytes()).expect("write");
            file.write_all(&s.im.to_le_bytes()).expect("write");
        }
    }

    let config = SourceConfig {
        kind: SourceKind::File {
            path: path.clone(),
            format: FileFormat::RawCf32,
        },
        samp_rate: 1_000_000,
        ..Default::default()
    };
    let analyzer = LocalAnalyzer::new(&config, AnalyzerParams::default()).expect("analyzer");

    let event = wait_event(&analyzer, |e| {
        matches!(e, AnalyzerEvent::Channel(update) if !update.channels.is_empty())
    });
    if let AnalyzerEvent::Channel(update) = event {
        for channel in &update.channels {
            assert!(channel.n0_db.is_finite());
            assert!(channel.s0_db > channel.n0_db);
        }
        let strongest = update
            .channels
            .iter()
            .max_by(|a, b| a.s0_db.partial_cmp(&b.s0_db).unwrap())
            .unwrap();
        assert!(
            (strongest.fc_hz - 100_000.0).abs() < 20_000.0,
            "strongest channel at {} Hz",
            strongest.fc_hz
        );
    }

    drop(analyzer);
    let _ = std::fs::remove_file(path);
}

#[test]
fn inspector_open_retune_close_acks_in_order() {
    let analyzer = silence_analyzer(1_000_000);
    let handle = open_inspector(&analyzer, "power", 100_000.0, 20_000.0);

    assert!(analyzer.set_inspector_frequency(handle, 200_000.0));
    wait_event(&analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::Inspector(InspectorEvent::FrequencyChanged { handle: h, freq_hz })
                if *h == handle && (*freq_hz - 200_000.0).abs() < 1.0
        )
    });

    assert!(analyzer.write(ControlMsg::Inspector(InspectorRequest {
        request_id: 2,
        kind: InspectorRequestKind::Close { handle },
    })));
    wait_event(&analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::Inspector(InspectorEvent::Closed { handle: h, .. }) if *h == handle
        )
    });

    // Closing again is a clean rejection.
    assert!(analyzer.write(ControlMsg::Inspector(InspectorRequest {
        request_id: 3,
        kind: InspectorRequestKind::Close { handle },
    })));
    wait_event(&analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::Inspector(InspectorEvent::WrongState { handle: h, .. }) if *h == handle
        )
    });
}

#[test]
fn inspector_signals_flow_from_scheduler() {
    let analyzer = silence_analyzer(1_000_000);
    let handle = open_inspector(&analyzer, "power", 50_000.0, 20_000.0);
    wait_event(&analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::Inspector(InspectorEvent::Signal { handle: h, name, .. })
                if *h == handle && *name == "power"
        )
    });
}

#[test]
fn unknown_inspector_class_is_rejected() {
    let analyzer = silence_analyzer(500_000);
    assert!(analyzer.write(ControlMsg::Inspector(InspectorRequest {
        request_id: 9,
        kind: InspectorRequestKind::Open {
            class: "psk".to_string(),
            fc_hz: 0.0,
            bw_hz: 1000.0,
            precise: false,
            pcm: None,
        },
    })));
    wait_event(&analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::Inspector(InspectorEvent::Error { request_id: 9, .. })
        )
    });
}

#[test]
fn invalid_handle_operations_are_clean_rejections() {
    let analyzer = silence_analyzer(500_000);
    assert!(!analyzer.set_inspector_frequency(42, 1000.0));
    assert!(!analyzer.set_inspector_bandwidth(42, 1000.0));
    assert!(analyzer.write(ControlMsg::Inspector(InspectorRequest {
        request_id: 5,
        kind: InspectorRequestKind::Close { handle: 42 },
    })));
    wait_event(&analyzer, |e| {
        matches!(
            e,
            AnalyzerEvent::Inspector(InspectorEvent::WrongHandle { handle: 42, .. })
        )
    });
}

#[test]
fn throttle_override_changes_effective_rate_and_converges() {
    let analyzer = silence_analyzer(2_000_000);
    assert!(analyzer.write(ControlMsg::Throttle(ThrottleRequest { samp_rate: 500_000 })));

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        std::thread::sleep(Duration::from_millis(100));
        let measured = analyzer.get_measured_samp_rate();
        if (measured - 500_000.0).abs() / 500_000.0 < 0.15 {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "measured rate stuck at {measured}"
        );
    }
    assert_eq!(analyzer.get_samp_rate(), 500_000);

    // Reset restores the source rate.
    assert!(analyzer.write(ControlMsg::Throttle(ThrottleRequest { samp_rate: 0 })));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(analyzer.get_samp_rate(), 2_000_000);
}

#[test]
fn repeated_bandwidth_sets_coalesce_and_apply_last() {
    let analyzer = silence_analyzer(1_000_000);
    let handle = open_inspector(&analyzer, "power", 100_000.0, 20_000.0);

    for i in 1..=10 {
        assert!(analyzer.set_inspector_bandwidth(handle, 1_000.0 * i as f64));
        let pending = analyzer
            .shared()
            .inspectors
            .lock()
            .unwrap()
            .pending_overrides();
        assert!(pending <= 1, "more than one pending override: {pending}");
    }

    // Acks may be coalesced; the last applied value must be the last set.
    let mut last_bw = 0.0;
    let deadline = Instant::now() + WAIT;
    while last_bw != 10_000.0 {
        assert!(Instant::now() < deadline, "final bandwidth was {last_bw}");
        if let Some(AnalyzerEvent::Inspector(InspectorEvent::BandwidthChanged {
            handle: h,
            bw_hz,
        })) = analyzer.poll()
        {
            assert_eq!(h, handle);
            last_bw = bw_hz;
        } else {
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

#[test]
fn wide_mutators_reject_in_channel_mode() {
    let analyzer = silence_analyzer(1_000_000);
    assert!(!analyzer.set_sweep_strategy(SweepStrategy::Progressive));
    assert!(!analyzer.set_spectrum_partitioning(SpectrumPartitioning::Continuous));
    assert!(!analyzer.set_hop_range(88.0e6, 108.0e6));
    assert!(!analyzer.set_buffering_size(4096));
    assert!(
        !analyzer.shared().sweep.lock().unwrap().requested,
        "sweep state mutated in channel mode"
    );
}

#[test]
fn wide_mode_requires_range_wider_than_one_acquisition() {
    let config = SourceConfig {
        samp_rate: 2_000_000,
        ..Default::default()
    };
    let params = AnalyzerParams {
        mode: AnalyzerMode::WideSpectrum,
        min_freq_hz: 100.0e6,
        max_freq_hz: 101.0e6,
        ..Default::default()
    };
    assert!(LocalAnalyzer::new(&config, params).is_err());
}

/// Source wrapper that records every retune; used to observe the sweep
/// and to simulate hardware that rejects the configured sample rate.
struct RecordingSource {
    samp_rate: u64,
    effective_samp_rate: u64,
    visited: Arc<Mutex<Vec<f64>>>,
    force_eos: AtomicBool,
    capturing: AtomicBool,
}

impl RecordingSource {
    fn new(samp_rate: u64, visited: Arc<Mutex<Vec<f64>>>) -> Self {
        Self {
            samp_rate,
            effective_samp_rate: samp_rate,
            visited,
            force_eos: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
        }
    }
}

impl Source for RecordingSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            permissions: Permissions::all_file() | Permissions::SET_FREQ,
            mtu: 8192,
            source_samp_rate: self.samp_rate,
            effective_samp_rate: self.effective_samp_rate,
            measured_samp_rate: self.effective_samp_rate as f64,
            realtime: false,
            ..Default::default()
        }
    }

    fn start(&self) -> Result<(), SourceError> {
        self.capturing.store(true, Ordering::Release);
        Ok(())
    }

    fn cancel(&self) {
        self.force_eos.store(true, Ordering::Release);
        self.capturing.store(false, Ordering::Release);
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    fn read(&self, buf: &mut [Sample]) -> Result<usize, SourceError> {
        if self.force_eos.load(Ordering::Acquire) {
            return Err(SourceError::Eos);
        }
        buf.fill(Sample::new(0.0, 0.0));
        Ok(buf.len())
    }

    fn set_frequency(&self, freq_hz: f64) -> Result<(), SourceError> {
        self.visited.lock().unwrap().push(freq_hz);
        Ok(())
    }

    fn set_gain(&self, _: &str, _: f64) -> Result<(), SourceError> {
        Err(SourceError::NotPermitted("set_gain"))
    }

    fn set_antenna(&self, _: &str) -> Result<(), SourceError> {
        Err(SourceError::NotPermitted("set_antenna"))
    }

    fn set_bandwidth(&self, _: f64) -> Result<(), SourceError> {
        Err(SourceError::NotPermitted("set_bandwidth"))
    }

    fn set_ppm(&self, _: f64) -> Result<(), SourceError> {
        Err(SourceError::NotPermitted("set_ppm"))
    }

    fn set_dc_remove(&self, _: bool) -> Result<(), SourceError> {
        Err(SourceError::NotPermitted("set_dc_remove"))
    }

    fn set_agc(&self, _: bool) -> Result<(), SourceError> {
        Err(SourceError::NotPermitted("set_agc"))
    }

    fn get_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn is_real_time(&self) -> bool {
        false
    }
}

#[test]
fn wide_sweep_visits_every_partition_once_per_sweep() {
    let visited = Arc::new(Mutex::new(Vec::new()));
    let source = Arc::new(RecordingSource::new(2_000_000, visited.clone()));
    let params = AnalyzerParams {
        mode: AnalyzerMode::WideSpectrum,
        min_freq_hz: 88.0e6,
        max_freq_hz: 108.0e6,
        sweep_strategy: SweepStrategy::Progressive,
        partitioning: SpectrumPartitioning::Discrete,
        ..Default::default()
    };
    let analyzer = LocalAnalyzer::with_source(source, params).expect("analyzer");

    // 10 partitions of 2 MHz across 20 MHz; wait until two full sweeps
    // were recorded.
    let deadline = Instant::now() + WAIT;
    while visited.lock().unwrap().len() < 20 {
        assert!(Instant::now() < deadline, "sweep too slow");
        std::thread::sleep(Duration::from_millis(20));
    }
    drop(analyzer);

    let visited = visited.lock().unwrap();
    let expected: Vec<f64> = (0..10).map(|i| 88.0e6 + (i as f64 + 0.5) * 2.0e6).collect();
    for sweep in visited.chunks_exact(10).take(2) {
        assert_eq!(sweep, &expected[..], "sweep order mismatch");
    }
}

#[test]
fn halt_with_running_inspector_tears_down_clean() {
    let analyzer = silence_analyzer(2_000_000);
    let _ = open_inspector(&analyzer, "audio", 100_000.0, 20_000.0);
    let _ = open_inspector(&analyzer, "power", -200_000.0, 50_000.0);

    // Give the scheduler some cycles with inspectors in flight.
    std::thread::sleep(Duration::from_millis(100));

    let pool = analyzer.shared().sched.pool().clone();
    drop(analyzer);
    let (_, acquired, _) = pool.counts();
    assert_eq!(acquired, 0, "buffers still marked acquired after teardown");
}

#[test]
fn slow_setters_respect_permissions_and_publish_info() {
    let analyzer = silence_analyzer(1_000_000);
    // Silence sources only allow retunes.
    assert!(!analyzer.set_gain("LNA", 10.0));
    assert!(!analyzer.set_dc_remove(true));
    assert!(!analyzer.set_agc(true));
    assert!(analyzer.set_frequency(98.0e6, 0.0));

    let event = wait_event(&analyzer, |e| matches!(e, AnalyzerEvent::SourceInfo(_)));
    if let AnalyzerEvent::SourceInfo(info) = event {
        assert_eq!(info.frequency_hz, 98.0e6);
    }

    assert!(analyzer.commit_source_info());
    wait_event(&analyzer, |e| matches!(e, AnalyzerEvent::SourceInfo(_)));
}

#[test]
fn file_source_runs_to_eos() {
    let mut path = std::env::temp_dir();
    path.push(format!("radscan-eos-{}.cf32", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).expect("create recording");
        let zeros = vec![0u8; 50_000 * 8];
        file.write_all(&zeros).expect("write");
    }
    let config = SourceConfig {
        kind: SourceKind::File {
            path: path.clone(),
            format: FileFormat::RawCf32,
        },
        samp_rate: 1_000_000,
        ..Default::default()
    };
    let analyzer = LocalAnalyzer::new(&config, AnalyzerParams::default()).expect("analyzer");
    wait_event(&analyzer, |e| matches!(e, AnalyzerEvent::Eos(_)));
    assert_eq!(analyzer.analyzer_state(), AnalyzerState::Stopping);
    drop(analyzer);
    let _ = std::fs::remove_file(path);
}

#[test]
fn iq_reverse_toggle_always_succeeds() {
    let analyzer = silence_analyzer(500_000);
    assert!(analyzer.set_iq_reverse(true));
    assert!(analyzer.set_iq_reverse(false));
}

#[test]
fn effective_rate_wins_over_configured_rate() {
    // Hardware that rounds 2 Msps down to 1.5 Msps: the analyzer and its
    // detector must follow the effective value.
    let source = Arc::new(RecordingSource {
        samp_rate: 2_000_000,
        effective_samp_rate: 1_500_000,
        visited: Arc::new(Mutex::new(Vec::new())),
        force_eos: AtomicBool::new(false),
        capturing: AtomicBool::new(false),
    });
    let analyzer =
        LocalAnalyzer::with_source(source, AnalyzerParams::default()).expect("analyzer");
    assert_eq!(analyzer.get_samp_rate(), 1_500_000);
    let detector_rate = analyzer
        .shared()
        .loop_state
        .lock()
        .unwrap()
        .detector
        .params()
        .samp_rate;
    assert_eq!(detector_rate, 1_500_000.0);
}

#[test]
fn params_update_adjusts_detector_and_cadences() {
    let analyzer = silence_analyzer(1_000_000);
    let mut params = AnalyzerParams::default();
    params.detector.window_size = 8192;
    params.channel_update_int = 0.5;
    params.psd_update_int = 0.2;
    assert!(analyzer.write(ControlMsg::Params(Box::new(params))));

    let deadline = Instant::now() + WAIT;
    loop {
        let (window, channels_int) = {
            let loop_state = analyzer.shared().loop_state.lock().unwrap();
            (
                loop_state.detector.params().window_size,
                loop_state.interval_channels,
            )
        };
        if window == 8192 && channels_int == 0.5 {
            break;
        }
        assert!(Instant::now() < deadline, "PARAMS never applied");
        std::thread::sleep(Duration::from_millis(5));
    }
}
