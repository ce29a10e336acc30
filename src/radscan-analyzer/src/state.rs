// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Analyzer lifecycle state machine.
//!
//! `Created → Starting → Running → Stopping → Stopped`, strictly forward.
//! A HALT request or a fatal source error moves the analyzer to `Stopping`;
//! the full drain plus thread join reaches `Stopped`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum AnalyzerState {
    Created = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl AnalyzerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Created,
        }
    }
}

impl fmt::Display for AnalyzerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
        };
        write!(f, "{name}")
    }
}

/// Lock-free holder of the lifecycle state; transitions only move forward.
pub struct StateCell {
    state: AtomicU8,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(AnalyzerState::Created as u8),
        }
    }

    pub fn get(&self) -> AnalyzerState {
        AnalyzerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` if it is strictly ahead of the current state.
    /// Returns `true` if a transition happened.
    pub fn advance(&self, next: AnalyzerState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if AnalyzerState::from_u8(current) >= next {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::debug!(
                        "analyzer state {} -> {}",
                        AnalyzerState::from_u8(current),
                        next
                    );
                    return true;
                }
                Err(seen) => current = seen,
            }
        }
    }
}
