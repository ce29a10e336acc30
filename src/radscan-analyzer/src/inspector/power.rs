// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use radscan_core::msg::InspectorConfig;
use radscan_core::Sample;

use super::{Inspector, InspectorContext, SignalSink};

/// Default reporting period, seconds of channel time.
const DEFAULT_INTERVAL_S: f64 = 0.1;

/// Mean-power meter: integrates `|x|^2` and reports a dB level at a
/// configurable cadence.
pub struct PowerInspector {
    samp_rate: f64,
    interval_samples: u64,
    acc: f64,
    count: u64,
}

impl PowerInspector {
    pub fn new(ctx: &InspectorContext) -> Self {
        let samp_rate = ctx.channel_samp_rate.max(1.0);
        Self {
            samp_rate,
            interval_samples: (samp_rate * DEFAULT_INTERVAL_S).max(1.0) as u64,
            acc: 0.0,
            count: 0,
        }
    }
}

impl Inspector for PowerInspector {
    fn class(&self) -> &'static str {
        "power"
    }

    fn feed(&mut self, samples: &[Sample], sink: &mut SignalSink) {
        for s in samples {
            self.acc += s.norm_sqr() as f64;
            self.count += 1;
            if self.count >= self.interval_samples {
                let mean = self.acc / self.count as f64;
                sink("power", 10.0 * mean.max(1e-20).log10());
                self.acc = 0.0;
                self.count = 0;
            }
        }
    }

    fn set_config(&mut self, config: &InspectorConfig) -> Result<(), String> {
        if let Some(interval) = config.get_float("power.interval") {
            if interval <= 0.0 {
                return Err(format!("bad power.interval: {interval}"));
            }
            self.interval_samples = (self.samp_rate * interval).max(1.0) as u64;
        }
        Ok(())
    }
}
