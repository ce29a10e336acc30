// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Spectral tuner: maintains a set of narrowband extraction channels over a
//! wideband stream. Each channel mixes its sub-band to DC, low-passes it
//! and decimates; extracted samples are handed to the caller synchronously
//! during [`SpectralTuner::feed`] and are only valid for that call.

use std::f64::consts::TAU;

use radscan_core::Sample;

use crate::filter::ComplexFirFilter;

/// Decimation is clamped to this to bound channel latency.
const MAX_DECIMATION: usize = 4096;

const TAPS_NORMAL: usize = 63;
const TAPS_PRECISE: usize = 127;

/// Extraction channel parameters, all in normalized frequency units
/// (fractions of the input sample rate; `f0_norm` in -0.5..0.5).
#[derive(Debug, Clone, Copy)]
pub struct TunerChannelParams {
    pub f0_norm: f64,
    /// Total (two-sided) bandwidth fraction.
    pub bw_norm: f64,
    /// Extra transition-band proportion kept around the channel.
    pub guard: f64,
    /// Use the long filter kernel for steeper skirts.
    pub precise: bool,
}

/// Stable identifier of an open channel. Slots are reused; the generation
/// field keeps stale identifiers from touching a newer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunerChannelId {
    slot: usize,
    generation: u32,
}

struct TunerChannel {
    params: TunerChannelParams,
    generation: u32,
    phase: f64,
    phase_inc: f64,
    fir: ComplexFirFilter,
    decimation: usize,
    decim_phase: usize,
    mixed: Vec<Sample>,
    filtered: Vec<Sample>,
    out: Vec<Sample>,
}

impl TunerChannel {
    fn new(params: TunerChannelParams, generation: u32, window_size: usize) -> Self {
        let occupancy = (params.bw_norm * (1.0 + params.guard)).clamp(1e-6, 1.0);
        let mut decimation = 1usize;
        while decimation * 2 <= MAX_DECIMATION && (decimation * 2) as f64 * occupancy <= 1.0 {
            decimation *= 2;
        }

        let taps = if params.precise {
            TAPS_PRECISE
        } else {
            TAPS_NORMAL
        };
        let cutoff = (occupancy / 2.0).min(0.5 / decimation as f64) as f32;

        Self {
            params,
            generation,
            phase: 0.0,
            phase_inc: -TAU * params.f0_norm,
            fir: ComplexFirFilter::new(cutoff, taps, window_size),
            decimation,
            decim_phase: 0,
            mixed: Vec::new(),
            filtered: Vec::new(),
            out: Vec::new(),
        }
    }

    fn process(&mut self, x: &[Sample]) {
        self.mixed.clear();
        self.mixed.reserve(x.len());
        for &s in x {
            let lo = Sample::from_polar(1.0, self.phase as f32);
            self.mixed.push(s * lo);
            self.phase += self.phase_inc;
            if self.phase > TAU {
                self.phase -= TAU;
            } else if self.phase < -TAU {
                self.phase += TAU;
            }
        }

        self.filtered.clear();
        self.fir.filter_block_into(&self.mixed, &mut self.filtered);

        self.out.clear();
        for &s in &self.filtered {
            if self.decim_phase == 0 {
                self.out.push(s);
            }
            self.decim_phase = (self.decim_phase + 1) % self.decimation;
        }
    }
}

/// The tuner proper. Not synchronized; the analyzer serializes access
/// under its scheduler lock.
pub struct SpectralTuner {
    window_size: usize,
    slots: Vec<Option<TunerChannel>>,
    next_generation: u32,
}

impl SpectralTuner {
    /// `window_size` is the largest block `feed` will be called with.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            slots: Vec::new(),
            next_generation: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn open_channel(&mut self, params: TunerChannelParams) -> TunerChannelId {
        self.next_generation += 1;
        let channel = TunerChannel::new(params, self.next_generation, self.window_size);
        let generation = channel.generation;

        let slot = match self.slots.iter().position(|s| s.is_none()) {
            Some(free) => {
                self.slots[free] = Some(channel);
                free
            }
            None => {
                self.slots.push(Some(channel));
                self.slots.len() - 1
            }
        };

        tracing::debug!(
            "opened tuner channel slot={} f0={:.4} bw={:.4} decim={}",
            slot,
            params.f0_norm,
            params.bw_norm,
            self.slots[slot].as_ref().map(|c| c.decimation).unwrap_or(1)
        );

        TunerChannelId { slot, generation }
    }

    fn channel_mut(&mut self, id: TunerChannelId) -> Option<&mut TunerChannel> {
        self.slots
            .get_mut(id.slot)
            .and_then(|slot| slot.as_mut())
            .filter(|ch| ch.generation == id.generation)
    }

    pub fn close_channel(&mut self, id: TunerChannelId) -> bool {
        match self.slots.get_mut(id.slot) {
            Some(slot) => match slot {
                Some(ch) if ch.generation == id.generation => {
                    *slot = None;
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    /// Retune an open channel; the filter is kept, only the oscillator
    /// moves.
    pub fn set_channel_freq(&mut self, id: TunerChannelId, f0_norm: f64) -> bool {
        match self.channel_mut(id) {
            Some(ch) => {
                ch.params.f0_norm = f0_norm;
                ch.phase_inc = -TAU * f0_norm;
                true
            }
            None => false,
        }
    }

    /// Change an open channel's bandwidth. The decimation (and therefore
    /// the output rate) is fixed at open time; only the filter cutoff
    /// follows the request.
    pub fn set_channel_bandwidth(&mut self, id: TunerChannelId, bw_norm: f64) -> bool {
        let window_size = self.window_size;
        match self.channel_mut(id) {
            Some(ch) => {
                ch.params.bw_norm = bw_norm;
                let occupancy = (bw_norm * (1.0 + ch.params.guard)).clamp(1e-6, 1.0);
                let cutoff = (occupancy / 2.0).min(0.5 / ch.decimation as f64) as f32;
                ch.fir = ComplexFirFilter::new(cutoff, ch.fir.taps(), window_size);
                true
            }
            None => false,
        }
    }

    /// Output-rate divisor of an open channel.
    pub fn decimation(&self, id: TunerChannelId) -> Option<usize> {
        match self.slots.get(id.slot) {
            Some(Some(ch)) if ch.generation == id.generation => Some(ch.decimation),
            _ => None,
        }
    }

    /// Push a block through every channel. `on_data` runs synchronously for
    /// each channel that produced output; returning `false` closes that
    /// channel once the feed completes.
    pub fn feed(
        &mut self,
        x: &[Sample],
        on_data: &mut dyn FnMut(TunerChannelId, &[Sample]) -> bool,
    ) {
        for slot in 0..self.slots.len() {
            let Some(ch) = self.slots[slot].as_mut() else {
                continue;
            };
            ch.process(x);
            if ch.out.is_empty() {
                continue;
            }
            let id = TunerChannelId {
                slot,
                generation: ch.generation,
            };
            // The slice borrow ends before the slot can be torn down.
            let keep = {
                let ch = self.slots[slot].as_ref().unwrap();
                on_data(id, &ch.out)
            };
            if !keep {
                self.slots[slot] = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU as TAU32;

    fn tone(freq_norm: f32, len: usize) -> Vec<Sample> {
        (0..len)
            .map(|n| Sample::from_polar(1.0, TAU32 * freq_norm * n as f32))
            .collect()
    }

    fn feed_collect(tuner: &mut SpectralTuner, x: &[Sample]) -> Vec<(TunerChannelId, Vec<Sample>)> {
        let mut got = Vec::new();
        tuner.feed(x, &mut |id, data| {
            got.push((id, data.to_vec()));
            true
        });
        got
    }

    #[test]
    fn extracts_tone_to_near_dc() {
        let mut tuner = SpectralTuner::new(4096);
        let id = tuner.open_channel(TunerChannelParams {
            f0_norm: 0.2,
            bw_norm: 0.02,
            guard: 0.25,
            precise: false,
        });
        let decim = tuner.decimation(id).expect("open channel");
        assert!(decim >= 16, "decimation was {decim}");

        // Let the FIR settle, then check the extracted stream sits at DC.
        let input = tone(0.2, 4096);
        feed_collect(&mut tuner, &input);
        let got = feed_collect(&mut tuner, &input);
        assert_eq!(got.len(), 1);
        let (_, out) = &got[0];
        assert_eq!(out.len(), 4096 / decim);

        let tail = &out[out.len() / 2..];
        for pair in tail.windows(2) {
            let dphi = (pair[1] * pair[0].conj()).arg();
            assert!(dphi.abs() < 0.2, "residual rotation {dphi}");
        }
        let power: f32 = tail.iter().map(|s| s.norm_sqr()).sum::<f32>() / tail.len() as f32;
        assert!(power > 0.5, "extracted power {power}");
    }

    #[test]
    fn out_of_band_tone_is_rejected() {
        let mut tuner = SpectralTuner::new(4096);
        let id = tuner.open_channel(TunerChannelParams {
            f0_norm: 0.2,
            bw_norm: 0.01,
            guard: 0.25,
            precise: true,
        });
        let input = tone(-0.3, 4096);
        feed_collect(&mut tuner, &input);
        let got = feed_collect(&mut tuner, &input);
        let (got_id, out) = &got[0];
        assert_eq!(*got_id, id);
        let power: f32 = out.iter().map(|s| s.norm_sqr()).sum::<f32>() / out.len() as f32;
        assert!(power < 1e-3, "stopband power {power}");
    }

    #[test]
    fn close_and_stale_ids() {
        let mut tuner = SpectralTuner::new(1024);
        let params = TunerChannelParams {
            f0_norm: 0.1,
            bw_norm: 0.05,
            guard: 0.25,
            precise: false,
        };
        let id = tuner.open_channel(params);
        assert_eq!(tuner.channel_count(), 1);
        assert!(tuner.close_channel(id));
        assert_eq!(tuner.channel_count(), 0);

        // Slot is reused but the stale id no longer resolves.
        let id2 = tuner.open_channel(params);
        assert!(!tuner.set_channel_freq(id, 0.2));
        assert!(!tuner.close_channel(id));
        assert!(tuner.set_channel_freq(id2, 0.2));
    }

    #[test]
    fn consumer_refusal_closes_channel() {
        let mut tuner = SpectralTuner::new(1024);
        tuner.open_channel(TunerChannelParams {
            f0_norm: 0.0,
            bw_norm: 0.5,
            guard: 0.0,
            precise: false,
        });
        let input = tone(0.0, 1024);
        tuner.feed(&input, &mut |_, _| false);
        assert_eq!(tuner.channel_count(), 0);
    }

    #[test]
    fn bandwidth_change_keeps_output_rate() {
        let mut tuner = SpectralTuner::new(2048);
        let id = tuner.open_channel(TunerChannelParams {
            f0_norm: 0.1,
            bw_norm: 0.02,
            guard: 0.25,
            precise: false,
        });
        let before = tuner.decimation(id).unwrap();
        assert!(tuner.set_channel_bandwidth(id, 0.04));
        assert_eq!(tuner.decimation(id), Some(before));
    }
}
