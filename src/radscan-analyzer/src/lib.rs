// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The Local Analyzer: a concurrent orchestration engine that couples an IQ
//! sample source, the spectral tuner, the channel detector, a per-channel
//! inspector scheduler and the slow-control path under one message-driven
//! state machine.
//!
//! Thread roster at steady state: the control thread multiplexing the input
//! queue, the source worker running the capture callback, the slow worker
//! applying blocking hardware mutations, and N scheduler workers running
//! inspectors, all meeting at a barrier once per capture cycle.

pub mod inspector;
pub mod local;
pub mod mq;
pub mod pool;
pub mod registry;
pub mod sched;
pub mod state;
pub mod sweep;
pub mod table;
pub mod throttle;
pub mod worker;

pub use local::LocalAnalyzer;
pub use mq::MessageQueue;
pub use pool::{PoolParams, SampleBuffer, SampleBufferPool};
pub use registry::lookup_class;
pub use throttle::Throttle;
pub use worker::{TaskStatus, Worker, WorkerTask};
