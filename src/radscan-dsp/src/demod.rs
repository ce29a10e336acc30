// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Demodulators used by the audio inspector.

use radscan_core::Sample;

/// Selects the demodulation algorithm for an extracted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demodulator {
    /// Upper sideband SSB: take the real part of baseband IQ.
    Usb,
    /// Lower sideband SSB: conjugate, then take the real part.
    Lsb,
    /// AM envelope detector: magnitude of IQ, DC removed downstream.
    Am,
    /// FM: instantaneous frequency via quadrature discriminator.
    Fm,
}

impl Demodulator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "usb" => Some(Self::Usb),
            "lsb" => Some(Self::Lsb),
            "am" => Some(Self::Am),
            "fm" => Some(Self::Fm),
            _ => None,
        }
    }

    /// Demodulate one block of baseband IQ samples into `out`.
    ///
    /// `prev` carries the last sample across block boundaries for the FM
    /// discriminator; pass the same slot on every call.
    pub fn demodulate(&self, samples: &[Sample], prev: &mut Option<Sample>, out: &mut Vec<f32>) {
        out.clear();
        out.reserve(samples.len());
        match self {
            Self::Usb => out.extend(samples.iter().map(|s| s.re)),
            Self::Lsb => out.extend(samples.iter().map(|s| s.conj().re)),
            Self::Am => out.extend(samples.iter().map(|s| s.norm())),
            Self::Fm => {
                for &s in samples {
                    let d = match prev {
                        Some(p) => (s * p.conj()).arg() / std::f32::consts::PI,
                        None => 0.0,
                    };
                    out.push(d);
                    *prev = Some(s);
                }
            }
        }
        if *self != Self::Fm {
            *prev = samples.last().copied();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn complex_tone(freq_norm: f32, len: usize) -> Vec<Sample> {
        (0..len)
            .map(|n| Sample::from_polar(1.0, TAU * freq_norm * n as f32))
            .collect()
    }

    #[test]
    fn fm_tone_frequency() {
        let input = complex_tone(0.25, 16);
        let mut prev = None;
        let mut out = Vec::new();
        Demodulator::Fm.demodulate(&input, &mut prev, &mut out);
        assert_eq!(out.len(), 16);
        assert!((out[0]).abs() < 1e-6);
        for &v in &out[1..] {
            assert!((v - 0.5).abs() < 0.01, "FM tone sample was {v}");
        }
    }

    #[test]
    fn fm_state_spans_blocks() {
        let input = complex_tone(0.25, 32);
        let mut prev = None;
        let mut a = Vec::new();
        let mut b = Vec::new();
        Demodulator::Fm.demodulate(&input[..16], &mut prev, &mut a);
        Demodulator::Fm.demodulate(&input[16..], &mut prev, &mut b);
        // First sample of the second block sees the carried-over phase.
        assert!((b[0] - 0.5).abs() < 0.01, "block-boundary sample {}", b[0]);
    }

    #[test]
    fn am_envelope() {
        let input = vec![Sample::new(3.0, 4.0), Sample::new(0.0, -2.0)];
        let mut prev = None;
        let mut out = Vec::new();
        Demodulator::Am.demodulate(&input, &mut prev, &mut out);
        assert_eq!(out, vec![5.0, 2.0]);
    }

    #[test]
    fn name_lookup() {
        assert_eq!(Demodulator::from_name("fm"), Some(Demodulator::Fm));
        assert_eq!(Demodulator::from_name("usb"), Some(Demodulator::Usb));
        assert_eq!(Demodulator::from_name("tetra"), None);
    }
}
