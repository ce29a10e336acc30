// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f32::consts::PI;

use radscan_core::config::WindowFunction;

/// Generate the coefficient vector for `window` at length `n`.
pub fn coefficients(window: WindowFunction, n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    let m = (n - 1) as f32;
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / m;
            match window {
                WindowFunction::Rectangular => 1.0,
                WindowFunction::Hann => 0.5 * (1.0 - x.cos()),
                WindowFunction::Hamming => 0.54 - 0.46 * x.cos(),
                WindowFunction::BlackmanHarris => {
                    0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos()
                        - 0.01168 * (3.0 * x).cos()
                }
            }
        })
        .collect()
}

/// Sum of squared coefficients, used to normalize PSD power.
pub fn energy(coeffs: &[f32]) -> f32 {
    coeffs.iter().map(|c| c * c).sum()
}
