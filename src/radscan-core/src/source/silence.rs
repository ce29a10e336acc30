// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Source that produces silence (all zeros). Used when no SDR hardware or
//! recording is present, and heavily by the test suite.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::error::SourceError;
use crate::Sample;

use super::{Permissions, Source, SourceConfig, SourceInfo};

const SILENCE_SOURCE_MTU: usize = 8192;

pub struct SilenceSource {
    info: Mutex<SourceInfo>,
    samp_rate: u64,
    consumed: AtomicU64,
    force_eos: AtomicBool,
    capturing: AtomicBool,
}

impl SilenceSource {
    pub fn new(config: &SourceConfig) -> Self {
        let samp_rate = config.samp_rate.max(1);
        let info = SourceInfo {
            permissions: Permissions::all_file() | Permissions::SET_FREQ,
            mtu: SILENCE_SOURCE_MTU,
            source_samp_rate: samp_rate,
            effective_samp_rate: samp_rate,
            measured_samp_rate: samp_rate as f64,
            frequency_hz: config.freq_hz,
            bandwidth_hz: config.bandwidth_hz,
            antenna: None,
            dc_remove: false,
            agc: false,
            source_start: None,
            realtime: false,
            seekable: false,
        };

        Self {
            info: Mutex::new(info),
            samp_rate,
            consumed: AtomicU64::new(0),
            force_eos: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
        }
    }

    fn reject(&self, what: &'static str) -> Result<(), SourceError> {
        Err(SourceError::NotPermitted(what))
    }
}

impl Source for SilenceSource {
    fn info(&self) -> SourceInfo {
        self.info.lock().expect("silence source info mutex").clone()
    }

    fn start(&self) -> Result<(), SourceError> {
        self.capturing.store(true, Ordering::Release);
        self.info
            .lock()
            .expect("silence source info mutex")
            .source_start = Some(SystemTime::now());
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
        let n = buf.len().min(SILENCE_SOURCE_MTU);
        buf[..n].fill(Sample::new(0.0, 0.0));
        self.consumed.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    fn set_frequency(&self, freq_hz: f64) -> Result<(), SourceError> {
        self.info
            .lock()
            .expect("silence source info mutex")
            .frequency_hz = freq_hz;
        Ok(())
    }

    fn set_gain(&self, _name: &str, _db: f64) -> Result<(), SourceError> {
        self.reject("set_gain")
    }

    fn set_antenna(&self, _name: &str) -> Result<(), SourceError> {
        self.reject("set_antenna")
    }

    fn set_bandwidth(&self, _bw_hz: f64) -> Result<(), SourceError> {
        self.reject("set_bandwidth")
    }

    fn set_ppm(&self, _ppm: f64) -> Result<(), SourceError> {
        self.reject("set_ppm")
    }

    fn set_dc_remove(&self, _enabled: bool) -> Result<(), SourceError> {
        self.reject("set_dc_remove")
    }

    fn set_agc(&self, _enabled: bool) -> Result<(), SourceError> {
        self.reject("set_agc")
    }

    fn get_time(&self) -> SystemTime {
        let start = self
            .info
            .lock()
            .expect("silence source info mutex")
            .source_start
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let consumed = self.consumed.load(Ordering::Acquire);
        start + Duration::from_secs_f64(consumed as f64 / self.samp_rate as f64)
    }

    fn is_real_time(&self) -> bool {
        false
    }
}
