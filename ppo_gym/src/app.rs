//! Wires the command line to the [`rl::Trainer`].

use crate::Args;
use anyhow::{Context, Result};
use ml::Module;
use rl::{envs, Env, TrainConfig, Trainer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Splits parsed arguments into the training config and an optional
/// checkpoint to resume from.
pub fn into_config(args: Args) -> (TrainConfig, Option<PathBuf>) {
    let config = TrainConfig {
        env: args.env,
        num_threads: args.num_threads,
        seed: args.seed,
        min_batch_size: args.min_batch_size,
        max_iter_num: args.max_iter_num,
        log_interval: args.log_interval,
        save_model_interval: args.save_model_interval,
        gamma: args.gamma,
        tau: args.tau,
        lr: args.lr,
        clip_epsilon: args.clip_epsilon,
        optim_epochs: args.optim_epochs,
        optim_batch_size: args.optim_batch_size,
        optim_value_iternum: args.optim_value_iternum,
        l2_reg: args.l2_reg,
        max_grad_norm: args.max_grad_norm,
        hidden: args.hidden,
        activation: args.activation,
        log_std: args.log_std,
        max_episode_steps: args.max_episode_steps,
        render: args.render,
        mean_action: false,
        assets_dir: args.assets_dir,
    };
    (config, args.model_path)
}

/// Log filter from `RUST_LOG`-style directives, falling back to `info`.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Run a full training session.
///
/// # Errors
///
/// Returns any configuration, environment, checkpoint or collection error.
pub fn run(args: Args) -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt().with_env_filter(log_filter(directives.as_deref())).init();

    let (config, model_path) = into_config(args);
    config.validate().context("invalid training configuration")?;

    let env_name = config.env.clone();
    let seed = config.seed;
    let probe = envs::make(&env_name, seed).with_context(|| format!("cannot create `{env_name}`"))?;
    tracing::info!(
        env = %env_name,
        observation_dim = probe.observation_dim(),
        action_space = ?probe.action_space(),
        "environment ready"
    );

    let mut trainer = Trainer::build(
        config,
        |i| envs::make(&env_name, seed.wrapping_add(i as u64)),
        model_path.as_deref(),
    )
    .context("failed to set up training")?;
    if let Some(path) = &model_path {
        tracing::info!("Resumed from {}", path.display());
    }
    tracing::info!(
        policy_params = trainer.policy().num_params(),
        value_params = trainer.value_net().num_params(),
        workers = trainer.config().num_threads,
        "starting training"
    );

    trainer.run().context("training failed")?;
    tracing::info!(iterations = trainer.iteration(), "training finished");
    Ok(())
}
