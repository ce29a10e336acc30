// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod analyzer;
pub mod config;
pub mod error;
pub mod msg;
pub mod source;

/// Complex baseband sample, interleaved I/Q as `f32`.
pub type Sample = num_complex::Complex<f32>;

pub use analyzer::Analyzer;
pub use config::{AnalyzerMode, AnalyzerParams, DetectorMode, DetectorParams, WindowFunction};
pub use error::{Error, Result, SourceError};
pub use msg::{AnalyzerEvent, ControlMsg, InspectorEvent, InspectorRequest};
pub use source::{Permissions, Source, SourceConfig, SourceInfo};
