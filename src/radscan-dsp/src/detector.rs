// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel detector: consumes sample bulks and produces either averaged PSD
//! frames plus a detected-channel list (spectrum mode) or a cyclic
//! autocorrelation plus a baud estimate (autocorrelation mode).

use std::sync::Arc;

use rustfft::num_complex::Complex as FftComplex;
use rustfft::{Fft, FftPlanner};

use radscan_core::config::{DetectorMode, DetectorParams};
use radscan_core::msg::ChannelInfo;
use radscan_core::Sample;

use crate::window;

/// Fraction of the lowest-power bins averaged into the noise floor.
const N0_FRACTION: f32 = 0.25;

/// Minimum contiguous bins above threshold to declare a channel.
const MIN_CHANNEL_BINS: usize = 2;

/// Below-threshold bins tolerated inside a channel before it is closed.
const MAX_GAP_BINS: usize = 2;

/// Autocorrelation peak must exceed this fraction of lag-zero power to
/// produce a baud estimate.
const BAUD_PEAK_MIN: f32 = 0.15;

pub struct ChannelDetector {
    params: DetectorParams,
    coeffs: Vec<f32>,
    window_energy: f32,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    staging: Vec<Sample>,
    fill: usize,
    scratch: Vec<FftComplex<f32>>,
    /// Averaged linear power per bin, natural FFT order.
    psd: Vec<f32>,
    /// Averaged autocorrelation magnitude (autocorrelation mode).
    acorr: Vec<f32>,
    iters: u64,
    n0: f32,
}

impl ChannelDetector {
    /// `params` must already be adjusted (see [`DetectorParams::adjust`]).
    pub fn new(params: DetectorParams) -> Self {
        let n = params.window_size;
        let coeffs = window::coefficients(params.window, n);
        let window_energy = window::energy(&coeffs).max(1e-12);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        Self {
            params,
            coeffs,
            window_energy,
            fft,
            ifft,
            staging: vec![Sample::new(0.0, 0.0); n],
            fill: 0,
            scratch: vec![FftComplex::new(0.0, 0.0); n],
            psd: vec![0.0; n],
            acorr: vec![0.0; n],
            iters: 0,
            n0: 0.0,
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Number of full windows processed so far.
    pub fn iters(&self) -> u64 {
        self.iters
    }

    /// Attempt an in-place parameter update. Fails (returning `false`) when
    /// the new parameters change the FFT geometry or the input rate, in
    /// which case the caller replaces the detector instance.
    pub fn set_params(&mut self, new: &DetectorParams) -> bool {
        if new.mode != self.params.mode
            || new.window_size != self.params.window_size
            || new.samp_rate != self.params.samp_rate
        {
            return false;
        }

        if new.window != self.params.window {
            self.coeffs = window::coefficients(new.window, self.params.window_size);
            self.window_energy = window::energy(&self.coeffs).max(1e-12);
        }
        self.params.window = new.window;
        self.params.fc = new.fc;
        self.params.alpha = new.alpha;
        self.params.snr_threshold_db = new.snr_threshold_db;
        true
    }

    /// Feed a bulk of samples; always consumes the whole slice, buffering
    /// any partial trailing window. Returns the number of samples consumed.
    pub fn feed_bulk(&mut self, x: &[Sample]) -> usize {
        let n = self.params.window_size;
        let mut rest = x;
        while !rest.is_empty() {
            let take = (n - self.fill).min(rest.len());
            self.staging[self.fill..self.fill + take].copy_from_slice(&rest[..take]);
            self.fill += take;
            rest = &rest[take..];
            if self.fill == n {
                self.process_window();
                self.fill = 0;
            }
        }
        x.len()
    }

    /// Drop any partially staged window and restart the averages. Used when
    /// the sweep retunes the front-end between hops.
    pub fn reset(&mut self) {
        self.fill = 0;
        self.iters = 0;
        self.psd.fill(0.0);
        self.acorr.fill(0.0);
        self.n0 = 0.0;
    }

    fn process_window(&mut self) {
        let n = self.params.window_size;
        for i in 0..n {
            let s = self.staging[i];
            let c = self.coeffs[i];
            self.scratch[i] = FftComplex::new(s.re * c, s.im * c);
        }
        self.fft.process(&mut self.scratch);

        let alpha = if self.iters == 0 { 1.0 } else { self.params.alpha };
        let scale = 1.0 / self.window_energy;
        for (avg, x) in self.psd.iter_mut().zip(self.scratch.iter()) {
            let p = (x.re * x.re + x.im * x.im) * scale;
            *avg += alpha * (p - *avg);
        }
        self.iters += 1;

        if self.params.mode == DetectorMode::Autocorrelation {
            self.update_autocorrelation();
        }

        self.update_n0();
    }

    fn update_autocorrelation(&mut self) {
        let n = self.params.window_size;
        for (dst, &p) in self.scratch.iter_mut().zip(self.psd.iter()) {
            *dst = FftComplex::new(p, 0.0);
        }
        self.ifft.process(&mut self.scratch);
        let norm = self.scratch[0].re.max(1e-12);
        for i in 0..n {
            self.acorr[i] = (self.scratch[i].re * self.scratch[i].re
                + self.scratch[i].im * self.scratch[i].im)
                .sqrt()
                / norm;
        }
    }

    fn update_n0(&mut self) {
        let mut sorted = self.psd.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let take = ((sorted.len() as f32 * N0_FRACTION) as usize).max(1);
        self.n0 = sorted[..take].iter().sum::<f32>() / take as f32;
        if self.n0 <= 0.0 {
            self.n0 = 1e-12;
        }
    }

    /// Noise floor estimate, dB.
    pub fn n0_db(&self) -> f32 {
        10.0 * self.n0.max(1e-12).log10()
    }

    /// Averaged PSD in dB, FFT-shifted so DC sits at the center bin.
    pub fn psd_db(&self) -> Vec<f32> {
        let n = self.psd.len();
        let half = n / 2;
        self.psd[half..]
            .iter()
            .chain(self.psd[..half].iter())
            .map(|&p| 10.0 * p.max(1e-12).log10())
            .collect()
    }

    /// Detected channels, frequencies relative to the acquisition center.
    pub fn channels(&self) -> Vec<ChannelInfo> {
        if self.iters == 0 {
            return Vec::new();
        }

        let n = self.psd.len();
        let half = n / 2;
        let bin_hz = self.params.samp_rate / n as f64;
        let threshold = self.n0 * 10f32.powf(self.params.snr_threshold_db / 10.0);
        let fc_offset_hz = self.params.fc as f64 * self.params.samp_rate;
        let n0_db = self.n0_db();

        // Iterate in shifted order so channels are contiguous in frequency.
        let shifted = |i: usize| self.psd[(i + half) % n];

        let mut out = Vec::new();
        let mut run_start: Option<usize> = None;
        let mut run_end = 0usize;
        let mut close_run = |start: usize, end: usize, out: &mut Vec<ChannelInfo>| {
            if end - start < MIN_CHANNEL_BINS {
                return;
            }
            let mut power = 0.0f64;
            let mut centroid = 0.0f64;
            let mut peak = 0.0f32;
            for k in start..end {
                let p = shifted(k);
                power += p as f64;
                centroid += p as f64 * (k as f64 - half as f64);
                peak = peak.max(p);
            }
            let f_lo = (start as f64 - half as f64) * bin_hz + fc_offset_hz;
            let f_hi = (end as f64 - half as f64) * bin_hz + fc_offset_hz;
            let fc = centroid / power * bin_hz + fc_offset_hz;
            let s0_db = 10.0 * peak.max(1e-12).log10();
            out.push(ChannelInfo {
                fc_hz: fc,
                f_lo_hz: f_lo,
                f_hi_hz: f_hi,
                bw_hz: f_hi - f_lo,
                snr_db: s0_db - n0_db,
                s0_db,
                n0_db,
            });
        };

        for i in 0..=n {
            let above = i < n && shifted(i) > threshold;
            if above {
                if run_start.is_none() {
                    run_start = Some(i);
                }
                run_end = i + 1;
            } else if let Some(start) = run_start {
                // Bridge short dips so one emission is not split by window
                // sidelobe nulls.
                if i < n && i - run_end < MAX_GAP_BINS {
                    continue;
                }
                close_run(start, run_end, &mut out);
                run_start = None;
            }
        }
        out
    }

    /// Baud estimate from the averaged autocorrelation; zero when no
    /// significant cyclic component was found.
    pub fn baud(&self) -> f32 {
        if self.params.mode != DetectorMode::Autocorrelation || self.iters == 0 {
            return 0.0;
        }
        let n = self.acorr.len();
        let mut best_lag = 0usize;
        let mut best = 0.0f32;
        for lag in 2..n / 2 {
            let v = self.acorr[lag];
            if v > best {
                best = v;
                best_lag = lag;
            }
        }
        if best < BAUD_PEAK_MIN || best_lag == 0 {
            return 0.0;
        }
        (self.params.samp_rate / best_lag as f64) as f32
    }
}
