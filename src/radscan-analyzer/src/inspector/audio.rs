// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use radscan_core::msg::InspectorConfig;
use radscan_core::Sample;
use radscan_dsp::Demodulator;
use tokio::sync::broadcast;

use super::{Inspector, InspectorContext, SignalSink};

/// PCM frame length in channel time.
const FRAME_DURATION_S: f64 = 0.02;

/// Demodulating inspector: publishes fixed-size PCM frames on the caller's
/// broadcast channel and a smoothed audio level on the signal sink.
pub struct AudioInspector {
    demodulator: Demodulator,
    prev: Option<Sample>,
    pcm: Option<broadcast::Sender<Vec<f32>>>,
    frame: Vec<f32>,
    frame_size: usize,
    scratch: Vec<f32>,
    level: f32,
    frames_since_report: usize,
}

impl AudioInspector {
    pub fn new(ctx: &InspectorContext) -> Self {
        let frame_size = ((ctx.channel_samp_rate * FRAME_DURATION_S) as usize).max(1);
        Self {
            demodulator: Demodulator::Fm,
            prev: None,
            pcm: ctx.pcm.clone(),
            frame: Vec::with_capacity(frame_size),
            frame_size,
            scratch: Vec::new(),
            level: 0.0,
            frames_since_report: 0,
        }
    }

    fn flush_frame(&mut self, sink: &mut SignalSink) {
        let frame = std::mem::replace(&mut self.frame, Vec::with_capacity(self.frame_size));
        let rms = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len().max(1) as f32).sqrt();
        self.level += 0.2 * (rms - self.level);

        if let Some(pcm) = &self.pcm {
            // Nobody listening is fine; frames are droppable.
            let _ = pcm.send(frame);
        }

        self.frames_since_report += 1;
        if self.frames_since_report >= 5 {
            self.frames_since_report = 0;
            sink("audio.level", 20.0 * (self.level.max(1e-10) as f64).log10());
        }
    }
}

impl Inspector for AudioInspector {
    fn class(&self) -> &'static str {
        "audio"
    }

    fn feed(&mut self, samples: &[Sample], sink: &mut SignalSink) {
        self.demodulator
            .demodulate(samples, &mut self.prev, &mut self.scratch);
        let mut scratch = std::mem::take(&mut self.scratch);
        for &pcm_sample in &scratch {
            self.frame.push(pcm_sample);
            if self.frame.len() >= self.frame_size {
                self.flush_frame(sink);
            }
        }
        scratch.clear();
        self.scratch = scratch;
    }

    fn set_config(&mut self, config: &InspectorConfig) -> Result<(), String> {
        if let Some(name) = config.get_str("audio.demod") {
            self.demodulator = Demodulator::from_name(name)
                .ok_or_else(|| format!("unknown demodulator: {name}"))?;
            self.prev = None;
        }
        Ok(())
    }
}
