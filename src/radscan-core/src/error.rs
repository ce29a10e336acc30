// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Error type for analyzer construction and control operations.
///
/// Hot paths never return this; they report success as a `bool` and carry
/// detail to the consumer through the output message queue.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error classification for source reads and mutations.
///
/// `Timeout`, `Overflow` and `Underflow` are retried inside the adapter and
/// must never reach the capture loop; everything else is hard.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("read timed out")]
    Timeout,

    #[error("stream overflow")]
    Overflow,

    #[error("stream underflow")]
    Underflow,

    #[error("end of stream")]
    Eos,

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("operation not permitted: {0}")]
    NotPermitted(&'static str),

    #[error("{0}")]
    Device(String),
}

impl SourceError {
    /// Whether the adapter should absorb this error and retry the read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Overflow | Self::Underflow)
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            std::io::ErrorKind::UnexpectedEof => Self::Eos,
            _ => Self::Device(err.to_string()),
        }
    }
}
