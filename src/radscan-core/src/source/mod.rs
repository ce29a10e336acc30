// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Source capability: the polymorphic IQ front-end consumed by the
//! analyzer. Adapters carry their own interior synchronization so that
//! `cancel` and the slow mutators can run concurrently with a blocking
//! `read` on the capture thread.

mod file;
mod silence;
#[cfg(feature = "soapysdr-sys")]
mod soapy;

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::Sample;

pub use file::FileSource;
pub use silence::SilenceSource;
#[cfg(feature = "soapysdr-sys")]
pub use soapy::SoapySource;

/// Bitset gating which mutators are legal on a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const SET_FREQ: Permissions = Permissions(1 << 0);
    pub const SET_GAIN: Permissions = Permissions(1 << 1);
    pub const SET_ANTENNA: Permissions = Permissions(1 << 2);
    pub const SET_BW: Permissions = Permissions(1 << 3);
    pub const SET_PPM: Permissions = Permissions(1 << 4);
    pub const SET_DC_REMOVE: Permissions = Permissions(1 << 5);
    pub const SET_AGC: Permissions = Permissions(1 << 6);
    pub const SEEK: Permissions = Permissions(1 << 7);
    pub const THROTTLE: Permissions = Permissions(1 << 8);

    /// Everything an SDR device supports by default.
    pub fn all_sdr() -> Self {
        Self::SET_FREQ
            | Self::SET_GAIN
            | Self::SET_ANTENNA
            | Self::SET_BW
            | Self::SET_PPM
            | Self::SET_DC_REMOVE
            | Self::SET_AGC
    }

    /// Everything a file source supports.
    pub fn all_file() -> Self {
        Self::SEEK | Self::THROTTLE
    }

    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn remove(&mut self, other: Permissions) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

/// Raw sample layout of an IQ recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Interleaved little-endian complex float32 (`.cf32` / gqrx raw).
    RawCf32,
}

/// Where the samples come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SourceKind {
    File {
        path: PathBuf,
        format: FileFormat,
    },
    Sdr {
        /// SoapySDR key=value args string (e.g. `"driver=rtlsdr"`).
        args: String,
    },
    /// All-zero samples; used when no hardware or recording is present.
    Silence,
}

/// One named gain element setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GainSetting {
    pub name: String,
    pub db: f64,
}

/// Full source configuration, as loaded from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Tuner frequency, Hz.
    pub freq_hz: f64,
    /// LNB downconversion offset, Hz.
    pub lnb_freq_hz: f64,
    pub samp_rate: u64,
    pub bandwidth_hz: f64,
    pub gains: Vec<GainSetting>,
    pub antenna: Option<String>,
    pub ppm: f64,
    pub dc_remove: bool,
    /// RX channel index on multichannel devices.
    pub channel: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Silence,
            freq_hz: 100_000_000.0,
            lnb_freq_hz: 0.0,
            samp_rate: 1_000_000,
            bandwidth_hz: 0.0,
            gains: Vec::new(),
            antenna: None,
            ppm: 0.0,
            dc_remove: false,
            channel: 0,
        }
    }
}

/// Source information exposed to the analyzer and its consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub permissions: Permissions,
    /// Largest single read the source can return in one call, samples.
    pub mtu: usize,
    /// Rate the configuration asked for.
    pub source_samp_rate: u64,
    /// Rate the hardware actually delivers.
    pub effective_samp_rate: u64,
    /// Smoothed rate observed by the capture loop.
    pub measured_samp_rate: f64,
    pub frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub antenna: Option<String>,
    pub dc_remove: bool,
    pub agc: bool,
    /// Wall-clock time capture started.
    #[serde(skip)]
    pub source_start: Option<SystemTime>,
    pub realtime: bool,
    pub seekable: bool,
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self {
            permissions: Permissions::default(),
            mtu: 0,
            source_samp_rate: 0,
            effective_samp_rate: 0,
            measured_samp_rate: 0.0,
            frequency_hz: 0.0,
            bandwidth_hz: 0.0,
            antenna: None,
            dc_remove: false,
            agc: false,
            source_start: None,
            realtime: false,
            seekable: false,
        }
    }
}

/// Capability set of an IQ front-end.
///
/// Methods take `&self`; every adapter synchronizes internally. Reads on
/// timeout/overflow/underflow retry inside the adapter; only hard errors
/// and EOS propagate to the caller.
pub trait Source: Send + Sync {
    /// Snapshot of the current source information.
    fn info(&self) -> SourceInfo;

    /// Begin capture. Must be called exactly once before the first `read`.
    fn start(&self) -> Result<(), SourceError>;

    /// Force end-of-stream: deactivate the underlying stream and make any
    /// in-flight or future `read` return [`SourceError::Eos`].
    fn cancel(&self);

    fn is_capturing(&self) -> bool;

    /// Read up to `buf.len()` samples. Returns the number of samples
    /// written; never returns zero except through `Err(Eos)`.
    fn read(&self, buf: &mut [Sample]) -> Result<usize, SourceError>;

    fn set_frequency(&self, freq_hz: f64) -> Result<(), SourceError>;
    fn set_gain(&self, name: &str, db: f64) -> Result<(), SourceError>;
    fn set_antenna(&self, name: &str) -> Result<(), SourceError>;
    fn set_bandwidth(&self, bw_hz: f64) -> Result<(), SourceError>;
    fn set_ppm(&self, ppm: f64) -> Result<(), SourceError>;
    fn set_dc_remove(&self, enabled: bool) -> Result<(), SourceError>;
    fn set_agc(&self, enabled: bool) -> Result<(), SourceError>;

    /// Source time of the last delivered sample: wall clock for live
    /// devices, stream position for recordings.
    fn get_time(&self) -> SystemTime;

    /// Reposition a recording. Optional capability.
    fn seek(&self, _pos: Duration) -> Result<(), SourceError> {
        Err(SourceError::NotSupported("seek"))
    }

    /// Total recording length in samples, when known. Optional capability.
    fn max_size(&self) -> Option<u64> {
        None
    }

    /// Whether reads are paced by hardware. Non-realtime sources are
    /// throttled by the analyzer.
    fn is_real_time(&self) -> bool;
}

/// Instantiate the adapter described by `config`.
pub fn open(config: &SourceConfig) -> Result<std::sync::Arc<dyn Source>, SourceError> {
    match &config.kind {
        SourceKind::File { path, format } => Ok(std::sync::Arc::new(FileSource::open(
            path, *format, config,
        )?)),
        SourceKind::Silence => Ok(std::sync::Arc::new(SilenceSource::new(config))),
        #[cfg(feature = "soapysdr-sys")]
        SourceKind::Sdr { args } => Ok(std::sync::Arc::new(soapy::SoapySource::open(
            args, config,
        )?)),
        #[cfg(not(feature = "soapysdr-sys"))]
        SourceKind::Sdr { .. } => Err(SourceError::NotSupported(
            "SDR sources require the soapysdr-sys feature",
        )),
    }
}
