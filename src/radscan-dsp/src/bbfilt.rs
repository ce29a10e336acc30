// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Baseband filter chain: in-place transforms applied to the full-rate
//! stream before it is split between the detector and the tuner.

use radscan_core::Sample;

/// One in-place transform over the baseband stream.
pub trait BasebandFilter: Send {
    fn name(&self) -> &'static str;
    fn apply(&mut self, samples: &mut [Sample]);
}

/// Ordered chain of baseband filters.
#[derive(Default)]
pub struct BasebandFilterChain {
    filters: Vec<Box<dyn BasebandFilter>>,
}

impl BasebandFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, filter: Box<dyn BasebandFilter>) {
        tracing::debug!("registering baseband filter `{}'", filter.name());
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn run(&mut self, samples: &mut [Sample]) {
        for filter in &mut self.filters {
            filter.apply(samples);
        }
    }
}

/// Single-pole IIR DC blocker applied independently to I and Q.
pub struct DcBlockerFilter {
    r: f32,
    x1: Sample,
    y1: Sample,
}

impl DcBlockerFilter {
    pub fn new(r: f32) -> Self {
        Self {
            r: r.clamp(0.9, 0.9999),
            x1: Sample::new(0.0, 0.0),
            y1: Sample::new(0.0, 0.0),
        }
    }
}

impl BasebandFilter for DcBlockerFilter {
    fn name(&self) -> &'static str {
        "dc-blocker"
    }

    fn apply(&mut self, samples: &mut [Sample]) {
        for s in samples.iter_mut() {
            let y = *s - self.x1 + self.y1 * self.r;
            self.x1 = *s;
            self.y1 = y;
            *s = y;
        }
    }
}
