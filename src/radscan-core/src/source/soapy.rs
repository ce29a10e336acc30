// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SoapySDR device source.
//!
//! `Device` is internally reference counted and shareable between threads;
//! the RX stream is not, so it lives behind its own mutex. Reads use a
//! short hardware timeout and retry internally so that `cancel` is observed
//! within one timeout period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use num_complex::Complex;
use soapysdr::Device;

use crate::error::SourceError;
use crate::Sample;

use super::{Permissions, Source, SourceConfig, SourceInfo};

/// Per-attempt hardware read timeout.
const READ_TIMEOUT_US: i64 = 100_000;

/// Consecutive retryable errors tolerated before the read is failed hard.
const MAX_RETRY_STREAK: u32 = 50;

pub struct SoapySource {
    device: Device,
    stream: Mutex<soapysdr::RxStream<Complex<f32>>>,
    info: Mutex<SourceInfo>,
    channel: usize,
    force_eos: AtomicBool,
    capturing: AtomicBool,
}

impl SoapySource {
    pub fn open(args: &str, config: &SourceConfig) -> Result<Self, SourceError> {
        tracing::info!("initialising SoapySDR device (args={:?})", args);

        let device =
            Device::new(args).map_err(|e| SourceError::device(format!("device open: {e}")))?;
        let channel = config.channel;
        let dir = soapysdr::Direction::Rx;

        if let Some(antenna) = &config.antenna {
            device
                .set_antenna(dir, channel, antenna.as_str())
                .map_err(|e| SourceError::device(format!("set antenna: {e}")))?;
        }

        // Disable AGC so eccentric receivers honor manual gain settings.
        if let Err(e) = device.set_gain_mode(dir, channel, false) {
            tracing::warn!("failed to disable hardware AGC: {}", e);
        }

        for gain in &config.gains {
            if let Err(e) = device.set_gain_element(dir, channel, gain.name.as_str(), gain.db) {
                tracing::warn!(
                    "failed to set gain `{}' to {} dB, ignoring: {}",
                    gain.name,
                    gain.db,
                    e
                );
            }
        }

        device
            .set_sample_rate(dir, channel, config.samp_rate as f64)
            .map_err(|e| SourceError::device(format!("set sample rate: {e}")))?;
        let effective_rate = device
            .sample_rate(dir, channel)
            .unwrap_or(config.samp_rate as f64);

        // No portable frequency-correction entry point; fold the ppm error
        // into the tuned frequency instead.
        let tune_hz =
            (config.freq_hz - config.lnb_freq_hz) * (1.0 + config.ppm * 1e-6);
        device
            .set_frequency(dir, channel, tune_hz, ())
            .map_err(|e| SourceError::device(format!("set frequency: {e}")))?;

        if config.bandwidth_hz > 0.0 {
            if let Err(e) = device.set_bandwidth(dir, channel, config.bandwidth_hz) {
                tracing::warn!("failed to set bandwidth, using default: {}", e);
            }
        }

        let dc_supported = device.has_dc_offset_mode(dir, channel).unwrap_or(false);
        let mut permissions = Permissions::all_sdr();
        if !dc_supported {
            permissions.remove(Permissions::SET_DC_REMOVE);
        } else if let Err(e) = device.set_dc_offset_mode(dir, channel, config.dc_remove) {
            tracing::warn!("failed to set DC offset mode: {}", e);
        }

        let stream = device
            .rx_stream::<Complex<f32>>(&[channel])
            .map_err(|e| SourceError::device(format!("rx stream: {e}")))?;
        let mtu = stream.mtu().unwrap_or(8192);

        let antenna = device.antenna(dir, channel).ok();

        let info = SourceInfo {
            permissions,
            mtu,
            source_samp_rate: config.samp_rate,
            effective_samp_rate: effective_rate.round() as u64,
            measured_samp_rate: effective_rate,
            frequency_hz: config.freq_hz,
            bandwidth_hz: config.bandwidth_hz,
            antenna,
            dc_remove: config.dc_remove && dc_supported,
            agc: false,
            source_start: None,
            realtime: true,
            seekable: false,
        };

        Ok(Self {
            device,
            stream: Mutex::new(stream),
            info: Mutex::new(info),
            channel,
            force_eos: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
        })
    }

    fn require(&self, perm: Permissions, what: &'static str) -> Result<(), SourceError> {
        if self.info.lock().expect("soapy info mutex").permissions.contains(perm) {
            Ok(())
        } else {
            Err(SourceError::NotPermitted(what))
        }
    }
}

impl Source for SoapySource {
    fn info(&self) -> SourceInfo {
        self.info.lock().expect("soapy info mutex").clone()
    }

    fn start(&self) -> Result<(), SourceError> {
        let mut stream = self.stream.lock().expect("soapy stream mutex");
        stream
            .activate(None)
            .map_err(|e| SourceError::device(format!("stream activate: {e}")))?;
        self.capturing.store(true, Ordering::Release);
        self.info.lock().expect("soapy info mutex").source_start = Some(SystemTime::now());
        tracing::info!("SoapySDR RX stream activated");
        Ok(())
    }

    fn cancel(&self) {
        self.force_eos.store(true, Ordering::Release);
        self.capturing.store(false, Ordering::Release);
        if let Ok(mut stream) = self.stream.lock() {
            if let Err(e) = stream.deactivate(None) {
                tracing::warn!("stream deactivate failed: {}", e);
            }
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    fn read(&self, buf: &mut [Sample]) -> Result<usize, SourceError> {
        let mut streak = 0u32;
        loop {
            if self.force_eos.load(Ordering::Acquire) {
                return Err(SourceError::Eos);
            }

            let result = {
                let mut stream = self.stream.lock().expect("soapy stream mutex");
                stream.read(&[&mut *buf], READ_TIMEOUT_US)
            };

            match result {
                Ok(n) if n > 0 => return Ok(n),
                Ok(_) => {
                    streak += 1;
                }
                Err(e) => {
                    let mapped = match e.code {
                        soapysdr::ErrorCode::Timeout => SourceError::Timeout,
                        soapysdr::ErrorCode::Overflow => SourceError::Overflow,
                        soapysdr::ErrorCode::Underflow => SourceError::Underflow,
                        _ => return Err(SourceError::device(e.to_string())),
                    };
                    if !mapped.is_retryable() {
                        return Err(mapped);
                    }
                    streak += 1;
                    tracing::debug!("retrying SDR read after {} (streak={})", mapped, streak);
                }
            }

            if streak >= MAX_RETRY_STREAK {
                return Err(SourceError::device("SDR stream stalled"));
            }
        }
    }

    fn set_frequency(&self, freq_hz: f64) -> Result<(), SourceError> {
        self.require(Permissions::SET_FREQ, "set_frequency")?;
        self.device
            .set_frequency(soapysdr::Direction::Rx, self.channel, freq_hz, ())
            .map_err(|e| SourceError::device(format!("set frequency: {e}")))?;
        self.info.lock().expect("soapy info mutex").frequency_hz = freq_hz;
        Ok(())
    }

    fn set_gain(&self, name: &str, db: f64) -> Result<(), SourceError> {
        self.require(Permissions::SET_GAIN, "set_gain")?;
        self.device
            .set_gain_element(soapysdr::Direction::Rx, self.channel, name, db)
            .map_err(|e| SourceError::device(format!("set gain: {e}")))
    }

    fn set_antenna(&self, name: &str) -> Result<(), SourceError> {
        self.require(Permissions::SET_ANTENNA, "set_antenna")?;
        self.device
            .set_antenna(soapysdr::Direction::Rx, self.channel, name)
            .map_err(|e| SourceError::device(format!("set antenna: {e}")))?;
        self.info.lock().expect("soapy info mutex").antenna = Some(name.to_string());
        Ok(())
    }

    fn set_bandwidth(&self, bw_hz: f64) -> Result<(), SourceError> {
        self.require(Permissions::SET_BW, "set_bandwidth")?;
        self.device
            .set_bandwidth(soapysdr::Direction::Rx, self.channel, bw_hz)
            .map_err(|e| SourceError::device(format!("set bandwidth: {e}")))?;
        self.info.lock().expect("soapy info mutex").bandwidth_hz = bw_hz;
        Ok(())
    }

    fn set_ppm(&self, ppm: f64) -> Result<(), SourceError> {
        self.require(Permissions::SET_PPM, "set_ppm")?;
        let info = self.info.lock().expect("soapy info mutex").clone();
        let tune_hz = info.frequency_hz * (1.0 + ppm * 1e-6);
        self.device
            .set_frequency(soapysdr::Direction::Rx, self.channel, tune_hz, ())
            .map_err(|e| SourceError::device(format!("set ppm: {e}")))
    }

    fn set_dc_remove(&self, enabled: bool) -> Result<(), SourceError> {
        self.require(Permissions::SET_DC_REMOVE, "set_dc_remove")?;
        self.device
            .set_dc_offset_mode(soapysdr::Direction::Rx, self.channel, enabled)
            .map_err(|e| SourceError::device(format!("set dc offset mode: {e}")))?;
        self.info.lock().expect("soapy info mutex").dc_remove = enabled;
        Ok(())
    }

    fn set_agc(&self, enabled: bool) -> Result<(), SourceError> {
        self.require(Permissions::SET_AGC, "set_agc")?;
        self.device
            .set_gain_mode(soapysdr::Direction::Rx, self.channel, enabled)
            .map_err(|e| SourceError::device(format!("set gain mode: {e}")))?;
        self.info.lock().expect("soapy info mutex").agc = enabled;
        Ok(())
    }

    fn get_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn is_real_time(&self) -> bool {
        true
    }
}
