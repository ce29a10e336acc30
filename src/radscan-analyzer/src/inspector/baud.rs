// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use radscan_core::config::{DetectorMode, DetectorParams};
use radscan_core::msg::InspectorConfig;
use radscan_core::Sample;
use radscan_dsp::ChannelDetector;

use super::{Inspector, InspectorContext, SignalSink};

/// Baud estimator: drives a channel detector in autocorrelation mode over
/// the extracted stream and reports the estimate once per full window.
pub struct BaudInspector {
    detector: ChannelDetector,
    windows_seen: u64,
}

impl BaudInspector {
    pub fn new(ctx: &InspectorContext) -> Self {
        let mut params = DetectorParams {
            mode: DetectorMode::Autocorrelation,
            samp_rate: ctx.channel_samp_rate.max(1.0),
            window_size: 1024,
            ..Default::default()
        };
        params.adjust();
        Self {
            detector: ChannelDetector::new(params),
            windows_seen: 0,
        }
    }
}

impl Inspector for BaudInspector {
    fn class(&self) -> &'static str {
        "baud"
    }

    fn feed(&mut self, samples: &[Sample], sink: &mut SignalSink) {
        self.detector.feed_bulk(samples);
        let iters = self.detector.iters();
        if iters > self.windows_seen {
            self.windows_seen = iters;
            let baud = self.detector.baud();
            if baud > 0.0 {
                sink("baud", baud as f64);
            }
        }
    }

    fn set_config(&mut self, _config: &InspectorConfig) -> Result<(), String> {
        Ok(())
    }
}
