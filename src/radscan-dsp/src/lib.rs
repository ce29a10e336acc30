// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Opaque DSP modules behind defined interfaces: FIR filtering (overlap-save
//! via `rustfft`), the channel detector (PSD + detected channels, or cyclic
//! autocorrelation + baud estimate), the spectral tuner (narrowband
//! sub-band extraction), baseband filter chains and demodulators.
//!
//! Nothing in this crate spawns threads or locks; concurrency is the
//! analyzer's business. All entry points take `&mut self` and are driven
//! from exactly one thread at a time.

pub mod bbfilt;
pub mod demod;
pub mod detector;
pub mod filter;
pub mod tuner;
pub mod window;

pub use bbfilt::{BasebandFilter, BasebandFilterChain, DcBlockerFilter};
pub use demod::Demodulator;
pub use detector::ChannelDetector;
pub use filter::ComplexFirFilter;
pub use tuner::{SpectralTuner, TunerChannelId, TunerChannelParams};
