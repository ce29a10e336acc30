// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Virtual pacer for non-realtime sources.
//!
//! Answers "how many samples may I read now?" from the wall-clock time
//! elapsed at the configured nominal rate. Live radios are paced by
//! hardware and bypass the throttle entirely.

use std::time::Instant;

/// Never accumulate more than this much of unread budget, so a stalled
/// consumer does not burst-read minutes of samples at once.
const MAX_BACKLOG_SECS: f64 = 0.25;

pub struct Throttle {
    samp_rate: u64,
    available: f64,
    last: Instant,
}

impl Throttle {
    pub fn new(samp_rate: u64) -> Self {
        Self {
            samp_rate: samp_rate.max(1),
            available: 0.0,
            last: Instant::now(),
        }
    }

    pub fn samp_rate(&self) -> u64 {
        self.samp_rate
    }

    /// Replace the rate and clear the accumulator.
    pub fn reset(&mut self, samp_rate: u64) {
        self.samp_rate = samp_rate.max(1);
        self.available = 0.0;
        self.last = Instant::now();
    }

    /// How many samples (at most `max`) may be read right now.
    pub fn advise(&mut self, max: usize) -> usize {
        self.advise_at(Instant::now(), max)
    }

    pub(crate) fn advise_at(&mut self, now: Instant, max: usize) -> usize {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        let cap = self.samp_rate as f64 * MAX_BACKLOG_SECS;
        self.available = (self.available + elapsed * self.samp_rate as f64).min(cap.max(1.0));
        (self.available as usize).min(max)
    }

    /// Debit `n` samples actually read.
    pub fn advance(&mut self, n: usize) {
        self.available = (self.available - n as f64).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn grants_elapsed_times_rate() {
        let mut throttle = Throttle::new(1_000_000);
        let t0 = Instant::now();
        throttle.last = t0;
        throttle.available = 0.0;

        let granted = throttle.advise_at(t0 + Duration::from_millis(10), usize::MAX);
        assert!(
            (9_000..=11_000).contains(&granted),
            "granted {granted} for 10 ms at 1 Msps"
        );
    }

    #[test]
    fn grant_respects_max() {
        let mut throttle = Throttle::new(1_000_000);
        let t0 = Instant::now();
        throttle.last = t0;
        let granted = throttle.advise_at(t0 + Duration::from_millis(100), 4096);
        assert_eq!(granted, 4096);
    }

    #[test]
    fn advance_debits_budget() {
        let mut throttle = Throttle::new(1000);
        let t0 = Instant::now();
        throttle.last = t0;
        let granted = throttle.advise_at(t0 + Duration::from_secs(1), usize::MAX);
        assert!(granted >= 250, "granted {granted}");
        throttle.advance(granted);
        let regrant = throttle.advise_at(t0 + Duration::from_secs(1), usize::MAX);
        assert_eq!(regrant, 0);
    }

    #[test]
    fn backlog_is_capped() {
        let mut throttle = Throttle::new(1000);
        let t0 = Instant::now();
        throttle.last = t0;
        let granted = throttle.advise_at(t0 + Duration::from_secs(60), usize::MAX);
        assert!(granted <= 250, "uncapped backlog {granted}");
    }

    #[test]
    fn override_then_reset_restores_rate() {
        let mut throttle = Throttle::new(2_000_000);
        throttle.reset(500_000);
        assert_eq!(throttle.samp_rate(), 500_000);
        throttle.reset(2_000_000);
        assert_eq!(throttle.samp_rate(), 2_000_000);
    }
}
