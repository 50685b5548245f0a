// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sample statistics and the Mann-Whitney U test.
//!
//! Latency samples across repeated runs are small and rarely normal, so
//! groups are compared with the rank-based Mann-Whitney U test using the
//! normal approximation with tie correction.

use serde::{Deserialize, Serialize};

/// Significance level used to flag differences.
pub const ALPHA: f64 = 0.05;

/// Location and spread of one group of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of samples
    pub n: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Largest deviation from the mean, in percent of the mean
    pub variation_pct: f64,
}

impl Summary {
    /// Summarize `samples`; `None` when empty.
    pub fn of(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let spread = samples
            .iter()
            .map(|v| (v - mean).abs())
            .fold(0.0, f64::max);
        let variation_pct = if mean != 0.0 { spread / mean.abs() * 100.0 } else { 0.0 };
        Some(Self { n, mean, variation_pct })
    }
}

/// Outcome of a two-sample Mann-Whitney U test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MannWhitney {
    /// The smaller of U1 and U2
    pub u_statistic: f64,
    /// Z-score of the normal approximation
    pub z_score: f64,
    /// Two-tailed p-value
    pub p_value: f64,
}

impl MannWhitney {
    /// True when `p_value < ALPHA`.
    pub fn significant(&self) -> bool {
        self.p_value < ALPHA
    }
}

/// Run the test; `None` when either sample is empty.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Option<MannWhitney> {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return None;
    }

    let mut combined: Vec<(f64, bool)> = a
        .iter()
        .map(|&x| (x, true))
        .chain(b.iter().map(|&x| (x, false)))
        .collect();
    combined.sort_by(|x, y| x.0.total_cmp(&y.0));

    let n = combined.len();
    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && combined[j].0 == combined[i].0 {
            j += 1;
        }
        // Positions i..j share the average of ranks i+1..=j.
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let ties = (j - i) as f64;
        tie_term += ties * ties * ties - ties;
        rank_sum_a += avg_rank * combined[i..j].iter().filter(|(_, in_a)| *in_a).count() as f64;
        i = j;
    }

    let (n1f, n2f, nf) = (n1 as f64, n2 as f64, n as f64);
    let u1 = rank_sum_a - n1f * (n1f + 1.0) / 2.0;
    let u2 = n1f * n2f - u1;
    let u_statistic = u1.min(u2);

    let mu = n1f * n2f / 2.0;
    let correction = if n > 1 { tie_term / (nf * (nf - 1.0)) } else { 0.0 };
    let variance = n1f * n2f / 12.0 * ((nf + 1.0) - correction);
    let z_score = if variance > 0.0 {
        (u_statistic - mu) / variance.sqrt()
    } else {
        0.0
    };
    let p_value = (2.0 * (1.0 - normal_cdf(z_score.abs()))).clamp(0.0, 1.0);

    Some(MannWhitney {
        u_statistic,
        z_score,
        p_value,
    })
}

/// Standard normal CDF (Abramowitz and Stegun 7.1.26).
fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}
