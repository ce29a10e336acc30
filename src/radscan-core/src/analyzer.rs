// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Analyzer capability: the interface front-ends program against,
//! implemented by the local analyzer (and, elsewhere, by remote proxies).
//!
//! Mutators report success as a `bool`; failure detail, acknowledgements
//! and results travel on the output queue read through [`Analyzer::read`].

use crate::config::{SpectrumPartitioning, SweepStrategy};
use crate::msg::{AnalyzerEvent, ControlMsg, InspectorHandle};
use crate::source::SourceInfo;

pub trait Analyzer: Send + Sync {
    // -- Slow-control (hardware) mutators -----------------------------------

    /// Retune the front-end. `lnb_hz` is subtracted before the hardware
    /// sees the frequency.
    fn set_frequency(&self, freq_hz: f64, lnb_hz: f64) -> bool;
    fn set_gain(&self, name: &str, db: f64) -> bool;
    fn set_antenna(&self, name: &str) -> bool;
    fn set_bandwidth(&self, bw_hz: f64) -> bool;
    fn set_ppm(&self, ppm: f64) -> bool;
    fn set_dc_remove(&self, enabled: bool) -> bool;
    fn set_agc(&self, enabled: bool) -> bool;

    // -- In-process mutators ------------------------------------------------

    fn set_iq_reverse(&self, enabled: bool) -> bool;

    /// Wide-spectrum only; rejects in channel mode.
    fn set_sweep_strategy(&self, strategy: SweepStrategy) -> bool;
    /// Wide-spectrum only; rejects in channel mode.
    fn set_spectrum_partitioning(&self, partitioning: SpectrumPartitioning) -> bool;
    /// Wide-spectrum only; rejects in channel mode.
    fn set_hop_range(&self, min_hz: f64, max_hz: f64) -> bool;
    /// Wide-spectrum only; rejects in channel mode.
    fn set_buffering_size(&self, samples: usize) -> bool;

    // -- Fast inspector parameter changes (coalesced) -----------------------

    fn set_inspector_frequency(&self, handle: InspectorHandle, freq_hz: f64) -> bool;
    fn set_inspector_bandwidth(&self, handle: InspectorHandle, bw_hz: f64) -> bool;

    // -- Introspection ------------------------------------------------------

    fn force_eos(&self) -> bool;
    fn is_real_time(&self) -> bool;
    /// Effective sample rate of the source (after throttle overrides).
    fn get_samp_rate(&self) -> u64;
    /// Smoothed sample rate observed by the capture loop.
    fn get_measured_samp_rate(&self) -> f64;
    /// Snapshot of the source information.
    fn get_source_info(&self) -> SourceInfo;
    /// Re-publish the source information on the output queue.
    fn commit_source_info(&self) -> bool;

    // -- Message plumbing ---------------------------------------------------

    /// Post a message on the input queue.
    fn write(&self, msg: ControlMsg) -> bool;
    /// Post an urgent HALT on the input queue.
    fn req_halt(&self);
    /// Blocking read of the next output event.
    fn read(&self) -> AnalyzerEvent;
    /// Non-blocking read of the next output event.
    fn poll(&self) -> Option<AnalyzerEvent>;
}
