//! The clipped-surrogate PPO update.

use crate::error::RlError;
use crate::policy::Policy;
use crate::value::ValueNet;
use ml::{Adam, Module, Tape, Tensor};

/// Rows of a batch that one optimizer step sees. Every per-row tensor is
/// `[n, 1]` except `states` and `actions`.
#[derive(Clone, Debug)]
pub struct MiniBatch {
    pub states: Tensor,
    pub actions: Tensor,
    pub returns: Tensor,
    pub advantages: Tensor,
    /// Log-probabilities under the policy that collected the batch.
    pub fixed_log_probs: Tensor,
}

impl MiniBatch {
    pub fn len(&self) -> usize {
        self.states.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out the given rows.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> MiniBatch {
        MiniBatch {
            states: self.states.select_rows(indices),
            actions: self.actions.select_rows(indices),
            returns: self.returns.select_rows(indices),
            advantages: self.advantages.select_rows(indices),
            fixed_log_probs: self.fixed_log_probs.select_rows(indices),
        }
    }

    fn check(&self) -> Result<(), RlError> {
        let n = self.len();
        if n == 0 {
            return Err(RlError::EmptyBatch);
        }
        for (what, got) in [
            ("actions", self.actions.rows()),
            ("returns", self.returns.len()),
            ("advantages", self.advantages.len()),
            ("fixed_log_probs", self.fixed_log_probs.len()),
        ] {
            if got != n {
                return Err(RlError::LengthMismatch { what, expected: n, got });
            }
        }
        Ok(())
    }
}

/// Settings of a single update step.
#[derive(Clone, Debug)]
pub struct PpoParams {
    /// Base learning rate before annealing.
    pub lr: f32,
    pub clip_epsilon: f32,
    /// Value-function optimizer steps per call.
    pub value_iters: usize,
    /// Weight of the squared-norm penalty on the value parameters.
    pub l2_reg: f32,
    /// Global norm cap on the policy gradient.
    pub max_grad_norm: Option<f32>,
}

impl Default for PpoParams {
    fn default() -> Self {
        Self {
            lr: 7e-4,
            clip_epsilon: 0.2,
            value_iters: 1,
            l2_reg: 0.0,
            max_grad_norm: Some(40.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PpoStepStats {
    pub policy_loss: f32,
    /// Mean squared error of the last value iteration, before any penalty.
    pub value_loss: f32,
    /// Share of rows whose ratio left `[1 - ε, 1 + ε]`.
    pub clip_fraction: f32,
    /// `mean(old_log_prob - new_log_prob)`.
    pub approx_kl: f32,
    /// Policy gradient norm before clipping.
    pub grad_norm: f32,
}

/// Runs one PPO update on `batch`.
///
/// Both optimizers are set to `params.lr * lr_mult` first. The value network
/// then regresses onto `returns` for `params.value_iters` steps, after which
/// the policy takes one step on
/// `-mean(min(r·A, clamp(r, 1-ε, 1+ε)·A))` with `r = exp(new - old)`.
/// Each network gets its own tape.
pub fn ppo_step<P: Policy>(
    policy: &mut P,
    value_net: &mut ValueNet,
    policy_opt: &mut Adam,
    value_opt: &mut Adam,
    batch: &MiniBatch,
    params: &PpoParams,
    lr_mult: f32,
) -> Result<PpoStepStats, RlError> {
    batch.check()?;
    let lr = params.lr * lr_mult;
    policy_opt.set_lr(lr);
    value_opt.set_lr(lr);

    let mut value_loss = 0.0;
    for _ in 0..params.value_iters {
        let mut tape = Tape::new();
        let values = value_net.forward(&batch.states, &mut tape);
        let mse = values.sub(&batch.returns, &mut tape).square(&mut tape).reduce_mean(&mut tape);
        value_loss = mse.data[0];
        let mut loss = mse;
        if params.l2_reg > 0.0 {
            for p in value_net.params() {
                let penalty = p.square(&mut tape).reduce_sum(&mut tape).mul_scalar(params.l2_reg, &mut tape);
                loss = loss.add(&penalty, &mut tape);
            }
        }
        let grads = tape.backward(&loss)?;
        value_opt.step(&mut value_net.params_mut(), &grads);
    }

    let eps = params.clip_epsilon;
    let mut tape = Tape::new();
    let log_probs = policy.log_prob(&batch.states, &batch.actions, &mut tape);
    let ratio = log_probs.sub(&batch.fixed_log_probs, &mut tape).exp(&mut tape);
    let surr1 = ratio.mul(&batch.advantages, &mut tape);
    let surr2 = ratio.clamp(1.0 - eps, 1.0 + eps, &mut tape).mul(&batch.advantages, &mut tape);
    let policy_loss = surr1.min(&surr2, &mut tape).reduce_mean(&mut tape).mul_scalar(-1.0, &mut tape);

    let mut grads = tape.backward(&policy_loss)?;
    let grad_norm = match params.max_grad_norm {
        Some(max_norm) => grads.clip_norm(&policy.params(), max_norm),
        None => grads.norm(&policy.params()),
    };
    policy_opt.step(&mut policy.params_mut(), &grads);

    let n = batch.len() as f32;
    let clipped = ratio.data.iter().filter(|r| (*r - 1.0).abs() > eps).count();
    let approx_kl = batch
        .fixed_log_probs
        .data
        .iter()
        .zip(&log_probs.data)
        .map(|(old, new)| old - new)
        .sum::<f32>()
        / n;

    let stats = PpoStepStats {
        policy_loss: policy_loss.data[0],
        value_loss,
        clip_fraction: clipped as f32 / n,
        approx_kl,
        grad_norm,
    };
    tracing::debug!(
        policy_loss = stats.policy_loss,
        value_loss = stats.value_loss,
        clip_fraction = stats.clip_fraction,
        approx_kl = stats.approx_kl,
        grad_norm = stats.grad_norm,
        lr,
        "ppo step"
    );
    Ok(stats)
}
