// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wide-spectrum sweep planning: where to retune the front-end next.
//!
//! Mutators stage changes into a pending parameter set; the capture loop
//! publishes `pending → current` atomically at the next hop boundary.

use radscan_core::config::{SpectrumPartitioning, SweepStrategy};

/// Retuning policy of one sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepParams {
    pub min_freq_hz: f64,
    pub max_freq_hz: f64,
    pub strategy: SweepStrategy,
    pub partitioning: SpectrumPartitioning,
    /// Samples to collect at one center before hopping on.
    pub fft_min_samples: usize,
}

/// Current/pending pair plus the publish request flag.
pub struct SweepState {
    pub current: SweepParams,
    pub pending: SweepParams,
    pub requested: bool,
}

impl SweepState {
    pub fn new(params: SweepParams) -> Self {
        Self {
            current: params,
            pending: params,
            requested: false,
        }
    }

    /// Stage a mutation. The first staged change after a publish starts
    /// from `current`; later ones accumulate on `pending`.
    pub fn stage(&mut self, mutate: impl FnOnce(&mut SweepParams)) {
        if !self.requested {
            self.pending = self.current;
        }
        mutate(&mut self.pending);
        self.requested = true;
    }

    /// Publish `pending → current` if requested; returns the new current
    /// parameters when a publish happened.
    pub fn publish(&mut self) -> Option<SweepParams> {
        if !self.requested {
            return None;
        }
        self.current = self.pending;
        self.requested = false;
        Some(self.current)
    }
}

/// Small deterministic PRNG for the stochastic strategies; seeded per
/// planner so tests can pin the sequence.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed | 1,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn shuffle(&mut self, order: &mut [usize]) {
        for i in (1..order.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            order.swap(i, j);
        }
    }
}

/// Produces the sequence of hop centers for the current sweep parameters.
pub struct SweepPlanner {
    params: SweepParams,
    samp_rate: f64,
    order: Vec<usize>,
    pos: usize,
    cursor: f64,
    rng: XorShift64,
}

impl SweepPlanner {
    pub fn new(params: SweepParams, samp_rate: f64, seed: u64) -> Self {
        let mut planner = Self {
            params,
            samp_rate: samp_rate.max(1.0),
            order: Vec::new(),
            pos: 0,
            cursor: 0.0,
            rng: XorShift64::new(seed),
        };
        planner.rebuild();
        planner
    }

    /// Number of acquisition-wide partitions covering the range.
    pub fn partition_count(&self) -> usize {
        let range = (self.params.max_freq_hz - self.params.min_freq_hz).max(0.0);
        (range / self.samp_rate).ceil().max(1.0) as usize
    }

    pub fn params(&self) -> &SweepParams {
        &self.params
    }

    /// Adopt freshly published sweep parameters; restarts the sweep.
    pub fn reconfigure(&mut self, params: SweepParams, samp_rate: f64) {
        self.params = params;
        self.samp_rate = samp_rate.max(1.0);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.order = (0..self.partition_count()).collect();
        self.pos = self.order.len(); // force a reshuffle on the next hop
        self.cursor = self.params.min_freq_hz;
    }

    fn clamp_center(&self, center: f64) -> f64 {
        let half = self.samp_rate / 2.0;
        let lo = self.params.min_freq_hz + half;
        let hi = (self.params.max_freq_hz - half).max(lo);
        center.clamp(lo, hi)
    }

    /// Center frequency of the next hop.
    pub fn next_center(&mut self) -> f64 {
        match self.params.partitioning {
            SpectrumPartitioning::Discrete => {
                if self.pos >= self.order.len() {
                    self.pos = 0;
                    if self.params.strategy == SweepStrategy::Stochastic {
                        let mut order = std::mem::take(&mut self.order);
                        self.rng.shuffle(&mut order);
                        self.order = order;
                    }
                }
                let index = self.order[self.pos];
                self.pos += 1;
                self.clamp_center(
                    self.params.min_freq_hz + (index as f64 + 0.5) * self.samp_rate,
                )
            }
            SpectrumPartitioning::Continuous => match self.params.strategy {
                SweepStrategy::Progressive => {
                    let center = self.clamp_center(self.cursor + self.samp_rate / 2.0);
                    self.cursor += self.samp_rate;
                    if self.cursor >= self.params.max_freq_hz {
                        self.cursor = self.params.min_freq_hz;
                    }
                    center
                }
                SweepStrategy::Stochastic => {
                    let range =
                        (self.params.max_freq_hz - self.params.min_freq_hz - self.samp_rate)
                            .max(0.0);
                    let jitter = self.rng.next_f64() * range;
                    self.clamp_center(
                        self.params.min_freq_hz + self.samp_rate / 2.0 + jitter,
                    )
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(strategy: SweepStrategy, partitioning: SpectrumPartitioning) -> SweepParams {
        SweepParams {
            min_freq_hz: 88.0e6,
            max_freq_hz: 108.0e6,
            strategy,
            partitioning,
            fft_min_samples: 8192,
        }
    }

    #[test]
    fn discrete_progressive_visits_each_partition_once_per_sweep() {
        let samp_rate = 2.0e6;
        let mut planner = SweepPlanner::new(
            params(SweepStrategy::Progressive, SpectrumPartitioning::Discrete),
            samp_rate,
            1,
        );
        let n = planner.partition_count();
        assert_eq!(n, 10);

        for _sweep in 0..3 {
            let centers: Vec<f64> = (0..n).map(|_| planner.next_center()).collect();
            let mut sorted = centers.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            sorted.dedup_by(|a, b| (*a - *b).abs() < 1.0);
            assert_eq!(sorted.len(), n, "every partition exactly once");
            assert_eq!(centers, {
                let mut expect = centers.clone();
                expect.sort_by(|a, b| a.partial_cmp(b).unwrap());
                expect
            });
            assert!(centers[0] >= 88.0e6 + samp_rate / 2.0 - 1.0);
            assert!(*centers.last().unwrap() <= 108.0e6 - samp_rate / 2.0 + 1.0);
        }
    }

    #[test]
    fn discrete_stochastic_still_covers_every_partition() {
        let mut planner = SweepPlanner::new(
            params(SweepStrategy::Stochastic, SpectrumPartitioning::Discrete),
            2.0e6,
            0xDEADBEEF,
        );
        let n = planner.partition_count();
        for _sweep in 0..5 {
            let mut centers: Vec<f64> = (0..n).map(|_| planner.next_center()).collect();
            centers.sort_by(|a, b| a.partial_cmp(b).unwrap());
            centers.dedup_by(|a, b| (*a - *b).abs() < 1.0);
            assert_eq!(centers.len(), n, "stochastic sweep missed a partition");
        }
    }

    #[test]
    fn continuous_centers_stay_inside_range() {
        for strategy in [SweepStrategy::Progressive, SweepStrategy::Stochastic] {
            let mut planner = SweepPlanner::new(
                params(strategy, SpectrumPartitioning::Continuous),
                2.0e6,
                7,
            );
            for _ in 0..100 {
                let center = planner.next_center();
                assert!(center >= 88.0e6 + 1.0e6 - 1.0, "center {center}");
                assert!(center <= 108.0e6 - 1.0e6 + 1.0, "center {center}");
            }
        }
    }

    #[test]
    fn stage_and_publish_roundtrip() {
        let mut state = SweepState::new(params(
            SweepStrategy::Progressive,
            SpectrumPartitioning::Discrete,
        ));
        assert!(state.publish().is_none());

        state.stage(|p| p.strategy = SweepStrategy::Stochastic);
        state.stage(|p| p.fft_min_samples = 4096);
        assert!(state.requested);

        let published = state.publish().expect("publish");
        assert_eq!(published.strategy, SweepStrategy::Stochastic);
        assert_eq!(published.fft_min_samples, 4096);
        assert!(state.publish().is_none(), "publish is one-shot");
    }

    #[test]
    fn idempotent_strategy_set_publishes_once() {
        let mut state = SweepState::new(params(
            SweepStrategy::Progressive,
            SpectrumPartitioning::Discrete,
        ));
        state.stage(|p| p.strategy = SweepStrategy::Stochastic);
        state.stage(|p| p.strategy = SweepStrategy::Stochastic);
        assert_eq!(state.pending.strategy, SweepStrategy::Stochastic);
        let mut publishes = 0;
        if state.publish().is_some() {
            publishes += 1;
        }
        if state.publish().is_some() {
            publishes += 1;
        }
        assert_eq!(publishes, 1);
    }
}
