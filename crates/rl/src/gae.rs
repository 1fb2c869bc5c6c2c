//! Generalized Advantage Estimation.

use crate::error::RlError;

/// Per-step advantage and return targets, aligned with the batch they came from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Advantages {
    /// Normalized to zero mean and unit variance.
    pub advantages: Vec<f32>,
    /// Raw advantage plus the value estimate.
    pub returns: Vec<f32>,
}

/// Computes GAE over a flattened batch of episodes.
///
/// Runs backwards through the batch. A zero `mask` marks the last step of an
/// episode: nothing is bootstrapped across it and the accumulator restarts.
/// The final element has no successor, so its bootstrap value is zero.
pub fn estimate_advantages(
    rewards: &[f32],
    masks: &[f32],
    values: &[f32],
    gamma: f32,
    lambda: f32,
) -> Result<Advantages, RlError> {
    let n = rewards.len();
    for (what, len) in [("masks", masks.len()), ("values", values.len())] {
        if len != n {
            return Err(RlError::LengthMismatch { what, expected: n, got: len });
        }
    }

    let mut advantages = vec![0.0; n];
    let mut prev_value = 0.0;
    let mut prev_advantage = 0.0;
    for i in (0..n).rev() {
        let delta = rewards[i] + gamma * prev_value * masks[i] - values[i];
        advantages[i] = delta + gamma * lambda * prev_advantage * masks[i];
        prev_value = values[i];
        prev_advantage = advantages[i];
    }

    let returns = advantages.iter().zip(values).map(|(a, v)| a + v).collect();
    normalize(&mut advantages);
    Ok(Advantages { advantages, returns })
}

/// Centers `xs` and scales to unit population standard deviation. A
/// zero-variance input is only centered.
pub fn normalize(xs: &mut [f32]) {
    if xs.is_empty() {
        return;
    }
    let n = xs.len() as f32;
    let mean = xs.iter().sum::<f32>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt();
    if std == 0.0 || std <= f32::EPSILON * mean.abs() {
        xs.iter_mut().for_each(|x| *x -= mean);
    } else {
        xs.iter_mut().for_each(|x| *x = (*x - mean) / std);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_is_empty() {
        let out = estimate_advantages(&[], &[], &[], 0.99, 0.95).unwrap();
        assert!(out.advantages.is_empty());
        assert!(out.returns.is_empty());
    }

    #[test]
    fn length_mismatch_is_reported() {
        let err = estimate_advantages(&[1.0, 1.0], &[1.0, 0.0], &[0.0], 0.99, 0.95).unwrap_err();
        assert!(matches!(err, RlError::LengthMismatch { what: "values", expected: 2, got: 1 }));
    }

    #[test]
    fn single_step_advantage_is_centered() {
        let out = estimate_advantages(&[3.0], &[0.0], &[1.0], 0.99, 0.95).unwrap();
        assert_eq!(out.returns, vec![3.0]);
        assert_eq!(out.advantages, vec![0.0]);
    }
}
