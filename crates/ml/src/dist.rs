//! Probability helpers for stochastic policies.
//!
//! Densities are built from recorded tensor ops so they can be differentiated.
//! Samplers work on plain slices and take an explicit generator.

use crate::recorder::Recorder;
use crate::tensor::Tensor;
use std::f32::consts::PI;

/// `0.5 * ln(2π)`
pub const HALF_LN_2PI: f32 = 0.918_938_5;

/// Log-density of a diagonal Gaussian, summed over the action dimension.
///
/// `x` and `mean` are `[batch, dim]`, `log_std` is `[dim]`. Returns `[batch, 1]`.
pub fn normal_log_density(
    x: &Tensor,
    mean: &Tensor,
    log_std: &Tensor,
    recorder: &mut impl Recorder,
) -> Tensor {
    let neg_log_std = log_std.mul_scalar(-1.0, recorder);
    let inv_std = neg_log_std.exp(recorder);
    let z = x.sub(mean, recorder).mul_broadcast(&inv_std, recorder);
    z.square(recorder)
        .mul_scalar(-0.5, recorder)
        .add_broadcast(&neg_log_std, recorder)
        .add_scalar(-HALF_LN_2PI, recorder)
        .sum_rows(recorder)
}

/// Box-Muller draw from `N(0, 1)`.
pub fn standard_normal(rng: &mut fastrand::Rng) -> f32 {
    // 1 - U keeps the log argument in (0, 1].
    let u1 = 1.0 - rng.f32();
    let u2 = rng.f32();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let m = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&v| (v - m).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.iter().map(|&e| e / sum).collect()
}

/// Inverse-CDF draw from a categorical distribution.
pub fn sample_categorical(probs: &[f32], rng: &mut fastrand::Rng) -> usize {
    let u = rng.f32();
    let mut acc = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return i;
        }
    }
    // Rounding can leave `acc` a hair under 1.
    probs.len().saturating_sub(1)
}

pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}
