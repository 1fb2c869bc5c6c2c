use crate::agent::AgentConfig;
use crate::error::ConfigError;
use crate::ppo::PpoParams;
use ml::Activation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const INIT_STREAM: u64 = 0xC2B2_AE3D_27D4_EB4F;
const SHUFFLE_STREAM: u64 = 0x1656_67B1_9E37_79F9;

/// Every knob of a training run. Also stored in checkpoint headers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub env: String,
    pub num_threads: usize,
    pub seed: u64,
    /// Minimum number of transitions collected per iteration.
    pub min_batch_size: usize,
    pub max_iter_num: usize,
    pub log_interval: usize,
    /// Save every this many iterations; 0 never saves.
    pub save_model_interval: usize,
    pub gamma: f32,
    /// GAE λ.
    pub tau: f32,
    pub lr: f32,
    pub clip_epsilon: f32,
    pub optim_epochs: usize,
    pub optim_batch_size: usize,
    pub optim_value_iternum: usize,
    pub l2_reg: f32,
    /// 0 disables gradient clipping.
    pub max_grad_norm: f32,
    pub hidden: Vec<usize>,
    pub activation: String,
    /// Initial log standard deviation of Gaussian policies.
    pub log_std: f32,
    pub max_episode_steps: usize,
    pub render: bool,
    pub mean_action: bool,
    pub assets_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            env: "Pendulum-v1".into(),
            num_threads: 4,
            seed: 1,
            min_batch_size: 2048,
            max_iter_num: 500,
            log_interval: 1,
            save_model_interval: 0,
            gamma: 0.99,
            tau: 1.0,
            lr: 7e-4,
            clip_epsilon: 0.2,
            optim_epochs: 5,
            optim_batch_size: 4096,
            optim_value_iternum: 1,
            l2_reg: 0.0,
            max_grad_norm: 40.0,
            hidden: vec![128, 128],
            activation: "tanh".into(),
            log_std: 0.0,
            max_episode_steps: 10_000,
            render: false,
            mean_action: false,
            assets_dir: PathBuf::from("assets"),
        }
    }
}

fn at_least_one(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be at least 1"));
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")));
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(ConfigError::invalid(field, format!("{value} must be finite and non-negative")));
    }
    Ok(())
}

impl TrainConfig {
    /// # Errors
    ///
    /// Returns the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least_one("num_threads", self.num_threads)?;
        at_least_one("min_batch_size", self.min_batch_size)?;
        at_least_one("max_iter_num", self.max_iter_num)?;
        at_least_one("log_interval", self.log_interval)?;
        at_least_one("optim_epochs", self.optim_epochs)?;
        at_least_one("optim_batch_size", self.optim_batch_size)?;
        at_least_one("optim_value_iternum", self.optim_value_iternum)?;
        at_least_one("max_episode_steps", self.max_episode_steps)?;
        unit_interval("gamma", self.gamma)?;
        unit_interval("tau", self.tau)?;
        non_negative("clip_epsilon", self.clip_epsilon)?;
        non_negative("l2_reg", self.l2_reg)?;
        non_negative("max_grad_norm", self.max_grad_norm)?;
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(ConfigError::invalid("lr", format!("{} must be positive", self.lr)));
        }
        if !self.log_std.is_finite() {
            return Err(ConfigError::invalid("log_std", "must be finite"));
        }
        if self.hidden.contains(&0) {
            return Err(ConfigError::invalid("hidden", "layer widths must be at least 1"));
        }
        self.activation()?;
        Ok(())
    }

    pub fn activation(&self) -> Result<Activation, ConfigError> {
        self.activation
            .parse()
            .map_err(|e: ml::MlError| ConfigError::invalid("activation", e.to_string()))
    }

    /// Seed for fresh network weights.
    pub fn init_seed(&self) -> u64 {
        self.seed ^ INIT_STREAM
    }

    /// Seed for the mini-batch shuffle.
    pub fn shuffle_seed(&self) -> u64 {
        self.seed ^ SHUFFLE_STREAM
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            num_threads: self.num_threads,
            seed: self.seed,
            render: self.render,
            mean_action: self.mean_action,
            max_episode_steps: self.max_episode_steps,
        }
    }

    pub fn ppo_params(&self) -> PpoParams {
        PpoParams {
            lr: self.lr,
            clip_epsilon: self.clip_epsilon,
            value_iters: self.optim_value_iternum,
            l2_reg: self.l2_reg,
            max_grad_norm: (self.max_grad_norm > 0.0).then_some(self.max_grad_norm),
        }
    }

    /// Annealing factor for iteration `i`: `max(1 - i / max_iter_num, 0)`.
    pub fn lr_mult(&self, i: usize) -> f32 {
        (1.0 - i as f32 / self.max_iter_num as f32).max(0.0)
    }
}
