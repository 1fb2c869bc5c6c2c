//! # PPO Gym
//!
//! Trains a PPO agent on one of the built-in classic-control environments.
//! Progress is reported through `tracing`; set `RUST_LOG=debug` to see
//! per-worker and per-update diagnostics.

mod app;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the trainer.
#[derive(Parser, Debug)]
#[command(name = "ppo_gym", about = "Proximal Policy Optimization on classic-control tasks")]
pub struct Args {
    /// Environment id (CartPole-v1, Pendulum-v1, MountainCarContinuous-v0).
    #[arg(long)]
    env: String,

    /// Checkpoint to resume from instead of initialising fresh networks.
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Render worker 0's environment.
    #[arg(long)]
    render: bool,

    #[arg(long, default_value_t = 4)]
    num_threads: usize,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Minimum transitions collected per iteration.
    #[arg(long, default_value_t = 2048)]
    min_batch_size: usize,

    #[arg(long, default_value_t = 500)]
    max_iter_num: usize,

    #[arg(long, default_value_t = 1)]
    log_interval: usize,

    /// Save both networks every this many iterations (0 disables).
    #[arg(long, default_value_t = 0)]
    save_model_interval: usize,

    /// Discount factor.
    #[arg(long, visible_alias = "discount", default_value_t = 0.99)]
    gamma: f32,

    #[arg(long, default_value_t = 7e-4)]
    lr: f32,

    /// GAE lambda.
    #[arg(long, default_value_t = 1.0)]
    tau: f32,

    #[arg(long, default_value_t = 0.2)]
    clip_epsilon: f32,

    #[arg(long, default_value_t = 5)]
    optim_epochs: usize,

    #[arg(long, default_value_t = 4096)]
    optim_batch_size: usize,

    /// Value-function steps per mini-batch.
    #[arg(long, default_value_t = 1)]
    optim_value_iternum: usize,

    #[arg(long, default_value_t = 0.0)]
    l2_reg: f32,

    /// Policy gradient norm cap (0 disables).
    #[arg(long, default_value_t = 40.0)]
    max_grad_norm: f32,

    /// Hidden layer widths, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "128,128")]
    hidden: Vec<usize>,

    /// tanh, relu or sigmoid.
    #[arg(long, default_value = "tanh")]
    activation: String,

    /// Initial log standard deviation of Gaussian policies.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    log_std: f32,

    #[arg(long, default_value_t = 10_000)]
    max_episode_steps: usize,

    /// Checkpoints go to `{assets_dir}/learned_models/`.
    #[arg(long, default_value = "assets")]
    assets_dir: PathBuf,
}

fn main() -> Result<()> {
    app::run(Args::parse())
}
