//! Proximal Policy Optimization on top of the `ml` autodiff crate.
//!
//! [`Agent`] gathers trajectories on a pool of worker threads,
//! [`estimate_advantages`] turns them into GAE targets and [`ppo_step`]
//! applies the clipped update. [`Trainer`] drives the three in a loop.

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod env;
pub mod envs;
pub mod error;
pub mod gae;
pub mod memory;
pub mod policy;
pub mod ppo;
pub mod trainer;
pub mod value;

pub use agent::{sampler_seed, Agent, AgentConfig, CollectionLog};
pub use config::TrainConfig;
pub use env::{Action, ActionSpace, Env, Step};
pub use error::{CheckpointError, ConfigError, EnvError, RlError};
pub use gae::{estimate_advantages, Advantages};
pub use memory::{Batch, Memory, Transition};
pub use policy::{CategoricalPolicy, GaussianPolicy, Policy, PolicyNet};
pub use ppo::{ppo_step, MiniBatch, PpoParams, PpoStepStats};
pub use trainer::{IterationReport, Trainer};
pub use value::ValueNet;
