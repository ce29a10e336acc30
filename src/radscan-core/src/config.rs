// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Analyzer and detector parameter sets.

use serde::{Deserialize, Serialize};

/// Operating mode of the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerMode {
    /// One full-bandwidth acquisition is scanned; inspectors attach to
    /// sub-bands of it.
    Channel,
    /// The front-end is retuned across a range wider than one acquisition.
    WideSpectrum,
}

/// Retuning order for wide-spectrum sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStrategy {
    /// Visit hop centers in a random order, re-shuffled every sweep.
    Stochastic,
    /// Visit hop centers in ascending frequency order.
    Progressive,
}

/// How hop centers are placed inside the sweep range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumPartitioning {
    /// Hop centers on a fixed grid of sample-rate-wide partitions.
    Discrete,
    /// Hop centers may fall anywhere inside the range.
    Continuous,
}

/// Analysis mode of the channel detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorMode {
    /// Produce PSD frames and detected-channel lists.
    Spectrum,
    /// Produce a cyclic autocorrelation and a baud estimate.
    Autocorrelation,
}

/// FFT window applied before spectral estimation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
    Hamming,
    BlackmanHarris,
}

/// Channel detector parameters.
///
/// `adjust` must be called after populating the struct by hand; it clamps
/// the fields that depend on each other to sane combinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub mode: DetectorMode,
    /// Sample rate of the stream fed to the detector, in samples/s.
    pub samp_rate: f64,
    /// FFT window size in samples. Rounded up to a power of two.
    pub window_size: usize,
    pub window: WindowFunction,
    /// Tuner offset in normalized frequency units (-0.5..0.5).
    pub fc: f32,
    /// Exponential averaging coefficient for the PSD accumulator.
    pub alpha: f32,
    /// SNR above the noise floor required to declare a channel, in dB.
    pub snr_threshold_db: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            mode: DetectorMode::Spectrum,
            samp_rate: 1_000_000.0,
            window_size: 4096,
            window: WindowFunction::default(),
            fc: 0.0,
            alpha: 0.25,
            snr_threshold_db: 6.0,
        }
    }
}

impl DetectorParams {
    pub const MIN_WINDOW_SIZE: usize = 512;
    pub const MAX_WINDOW_SIZE: usize = 1 << 20;

    /// Clamp interdependent fields to legal values.
    pub fn adjust(&mut self) {
        self.window_size = self
            .window_size
            .next_power_of_two()
            .clamp(Self::MIN_WINDOW_SIZE, Self::MAX_WINDOW_SIZE);
        self.alpha = self.alpha.clamp(1e-4, 1.0);
        self.fc = self.fc.clamp(-0.5, 0.5);
        if self.samp_rate <= 0.0 {
            self.samp_rate = 1.0;
        }
    }
}

/// Top-level analyzer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerParams {
    pub mode: AnalyzerMode,
    /// Template for the channel detector; sample rate is overwritten with
    /// the source's effective rate at startup.
    pub detector: DetectorParams,
    /// Seconds between CHANNEL updates on the output queue.
    pub channel_update_int: f64,
    /// Seconds between PSD frames on the output queue.
    pub psd_update_int: f64,
    /// Lower bound of the sweep range (wide-spectrum mode only), Hz.
    pub min_freq_hz: f64,
    /// Upper bound of the sweep range (wide-spectrum mode only), Hz.
    pub max_freq_hz: f64,
    pub sweep_strategy: SweepStrategy,
    pub partitioning: SpectrumPartitioning,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        Self {
            mode: AnalyzerMode::Channel,
            detector: DetectorParams::default(),
            channel_update_int: 0.1,
            psd_update_int: 0.04,
            min_freq_hz: 0.0,
            max_freq_hz: 0.0,
            sweep_strategy: SweepStrategy::Stochastic,
            partitioning: SpectrumPartitioning::Discrete,
        }
    }
}
