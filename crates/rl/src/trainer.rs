//! The outer PPO loop: collect, estimate advantages, update, report.

use crate::agent::{Agent, CollectionLog};
use crate::checkpoint;
use crate::config::TrainConfig;
use crate::env::Env;
use crate::error::{EnvError, RlError};
use crate::gae::estimate_advantages;
use crate::memory::Batch;
use crate::policy::{Policy, PolicyNet};
use crate::ppo::{ppo_step, MiniBatch, PpoStepStats};
use crate::value::ValueNet;
use ml::{Adam, Module, NoGrad, Tensor};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one [`Trainer::train_iteration`].
#[derive(Clone, Debug)]
pub struct IterationReport {
    pub iteration: usize,
    pub log: CollectionLog,
    pub update_time: Duration,
    /// Averaged over every mini-batch step of the iteration.
    pub stats: PpoStepStats,
}

impl fmt::Display for IterationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\tT_sample {:.4}\tT_update {:.4}\tR_min {:.2}\tR_max {:.2}\tR_avg {:.2}",
            self.iteration,
            self.log.sample_time.as_secs_f64(),
            self.update_time.as_secs_f64(),
            self.log.min_reward,
            self.log.max_reward,
            self.log.avg_reward
        )
    }
}

pub struct Trainer {
    config: TrainConfig,
    agent: Agent<PolicyNet>,
    policy: Arc<PolicyNet>,
    value_net: ValueNet,
    policy_opt: Adam,
    value_opt: Adam,
    rng: fastrand::Rng,
    iteration: usize,
}

impl Trainer {
    /// Wires already-built parts together.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config or when the networks do not fit the
    /// agent's environments.
    pub fn new(
        config: TrainConfig,
        agent: Agent<PolicyNet>,
        policy: PolicyNet,
        value_net: ValueNet,
    ) -> Result<Self, RlError> {
        config.validate()?;
        agent.check_policy(&policy)?;
        if value_net.arch().obs_dim != agent.observation_dim() {
            return Err(RlError::LengthMismatch {
                what: "value observation",
                expected: agent.observation_dim(),
                got: value_net.arch().obs_dim,
            });
        }

        let policy_opt = Adam::new(&policy.params(), config.lr);
        let value_opt = Adam::new(&value_net.params(), config.lr);
        let rng = fastrand::Rng::with_seed(config.shuffle_seed());
        Ok(Self {
            config,
            agent,
            policy: Arc::new(policy),
            value_net,
            policy_opt,
            value_opt,
            rng,
            iteration: 0,
        })
    }

    /// Spawns the agent with `make_env` and either loads the networks from
    /// `model_path` or initialises them from the config seed.
    pub fn build<E, F>(config: TrainConfig, make_env: F, model_path: Option<&Path>) -> Result<Self, RlError>
    where
        E: Env + Send + 'static,
        F: FnMut(usize) -> Result<E, EnvError>,
    {
        config.validate()?;
        let agent = Agent::new(make_env, &config.agent_config())?;
        let (policy, value_net) = match model_path {
            Some(path) => {
                let ckpt = checkpoint::load(path)?;
                (ckpt.policy, ckpt.value)
            }
            None => {
                let mut rng = fastrand::Rng::with_seed(config.init_seed());
                let activation = config.activation()?;
                let obs_dim = agent.observation_dim();
                let policy = PolicyNet::new(
                    obs_dim,
                    agent.action_space(),
                    &config.hidden,
                    activation,
                    config.log_std,
                    &mut rng,
                );
                let value_net = ValueNet::new(obs_dim, &config.hidden, activation, &mut rng);
                (policy, value_net)
            }
        };
        Self::new(config, agent, policy, value_net)
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn policy(&self) -> &PolicyNet {
        &self.policy
    }

    pub fn value_net(&self) -> &ValueNet {
        &self.value_net
    }

    /// Number of completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        checkpoint::model_path(&self.config.assets_dir, &self.config.env)
    }

    pub fn save_checkpoint(&self) -> Result<PathBuf, RlError> {
        let path = self.checkpoint_path();
        checkpoint::save(&path, &self.config, &self.policy, &self.value_net)?;
        Ok(path)
    }

    /// Runs every optimisation epoch of iteration `i` on `batch`.
    ///
    /// Values and old log-probabilities are evaluated once, before any
    /// parameter changes. Each epoch walks a fresh permutation of the batch in
    /// `optim_batch_size` slices.
    pub fn update_params(&mut self, batch: &Batch, i: usize) -> Result<PpoStepStats, RlError> {
        if batch.is_empty() {
            return Err(RlError::EmptyBatch);
        }
        let policy = Arc::get_mut(&mut self.policy).ok_or(RlError::PolicyShared)?;

        let values = self.value_net.forward(&batch.states, &mut NoGrad);
        let fixed_log_probs = policy.log_prob(&batch.states, &batch.actions, &mut NoGrad);
        let adv = estimate_advantages(&batch.rewards, &batch.masks, &values.data, self.config.gamma, self.config.tau)?;

        let full = MiniBatch {
            states: batch.states.clone(),
            actions: batch.actions.clone(),
            returns: Tensor::column(adv.returns),
            advantages: Tensor::column(adv.advantages),
            fixed_log_probs,
        };
        let lr_mult = self.config.lr_mult(i);
        let params = self.config.ppo_params();

        let mut indices: Vec<usize> = (0..full.len()).collect();
        let mut total = PpoStepStats::default();
        let mut steps = 0usize;
        for _ in 0..self.config.optim_epochs {
            self.rng.shuffle(&mut indices);
            for chunk in indices.chunks(self.config.optim_batch_size) {
                let mini = full.select(chunk);
                let s = ppo_step(
                    policy,
                    &mut self.value_net,
                    &mut self.policy_opt,
                    &mut self.value_opt,
                    &mini,
                    &params,
                    lr_mult,
                )?;
                total.policy_loss += s.policy_loss;
                total.value_loss += s.value_loss;
                total.clip_fraction += s.clip_fraction;
                total.approx_kl += s.approx_kl;
                total.grad_norm += s.grad_norm;
                steps += 1;
            }
        }

        let n = steps.max(1) as f32;
        Ok(PpoStepStats {
            policy_loss: total.policy_loss / n,
            value_loss: total.value_loss / n,
            clip_fraction: total.clip_fraction / n,
            approx_kl: total.approx_kl / n,
            grad_norm: total.grad_norm / n,
        })
    }

    /// One collect-and-update round. Logs and checkpoints on the configured
    /// intervals.
    pub fn train_iteration(&mut self) -> Result<IterationReport, RlError> {
        let i = self.iteration;
        let (batch, log) = self.agent.collect_samples(&self.policy, self.config.min_batch_size)?;

        let start = Instant::now();
        let stats = self.update_params(&batch, i)?;
        let update_time = start.elapsed();
        self.iteration += 1;

        let report = IterationReport { iteration: i, log, update_time, stats };
        if i % self.config.log_interval == 0 {
            tracing::info!("{report}");
            tracing::debug!(
                steps = report.log.num_steps,
                episodes = report.log.num_episodes,
                policy_loss = stats.policy_loss,
                value_loss = stats.value_loss,
                approx_kl = stats.approx_kl,
                "iteration stats"
            );
        }
        let interval = self.config.save_model_interval;
        if interval > 0 && (i + 1) % interval == 0 {
            self.save_checkpoint()?;
        }
        Ok(report)
    }

    /// Trains until `max_iter_num` iterations have completed.
    pub fn run(&mut self) -> Result<Vec<IterationReport>, RlError> {
        let mut reports = Vec::with_capacity(self.config.max_iter_num.saturating_sub(self.iteration));
        while self.iteration < self.config.max_iter_num {
            reports.push(self.train_iteration()?);
        }
        Ok(reports)
    }
}
