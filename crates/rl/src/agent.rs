//! Parallel trajectory collection.
//!
//! [`Agent`] owns a fixed pool of worker threads, one environment each. A
//! collection round hands every worker an `Arc` of the current policy and a
//! step quota, then waits for all of them before merging their transitions in
//! worker order.

use crate::env::{ActionSpace, Env};
use crate::error::{ConfigError, EnvError, RlError};
use crate::memory::{Batch, Memory, Transition};
use crate::policy::Policy;
use crossbeam_channel::{unbounded, Receiver, Sender};
use ml::Tensor;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SAMPLER_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed of worker `worker`'s action sampler.
///
/// Environment factories seed with `seed + worker`; the sampler stream is
/// offset from that so reset noise and exploration noise never share draws.
pub fn sampler_seed(seed: u64, worker: usize) -> u64 {
    (seed ^ SAMPLER_STREAM).wrapping_add(worker as u64)
}

/// Collection-side settings.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub num_threads: usize,
    /// Worker `i` seeds its sampling generator with [`sampler_seed`].
    pub seed: u64,
    /// Worker 0 calls [`Env::render`] after every step.
    pub render: bool,
    /// Act with the distribution's mode instead of sampling.
    pub mean_action: bool,
    /// Episodes are cut here; the cut step is stored as terminal.
    pub max_episode_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            seed: 1,
            render: false,
            mean_action: false,
            max_episode_steps: 10_000,
        }
    }
}

/// Summary of one collection round.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionLog {
    pub num_steps: usize,
    pub num_episodes: usize,
    pub total_reward: f32,
    pub avg_reward: f32,
    pub min_reward: f32,
    pub max_reward: f32,
    pub sample_time: Duration,
    /// Per-dimension statistics over the collected action rows.
    pub action_mean: Vec<f32>,
    pub action_min: Vec<f32>,
    pub action_max: Vec<f32>,
}

impl fmt::Display for CollectionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "steps {} episodes {} R_min {:.2} R_max {:.2} R_avg {:.2} T_sample {:.4}",
            self.num_steps,
            self.num_episodes,
            self.min_reward,
            self.max_reward,
            self.avg_reward,
            self.sample_time.as_secs_f64()
        )
    }
}

/// Episodic reward totals of one worker.
#[derive(Clone, Copy, Debug)]
struct EpisodeStats {
    num_episodes: usize,
    total_reward: f32,
    min_reward: f32,
    max_reward: f32,
}

impl Default for EpisodeStats {
    fn default() -> Self {
        Self {
            num_episodes: 0,
            total_reward: 0.0,
            min_reward: f32::INFINITY,
            max_reward: f32::NEG_INFINITY,
        }
    }
}

impl EpisodeStats {
    fn record(&mut self, episode_reward: f32) {
        self.num_episodes += 1;
        self.total_reward += episode_reward;
        self.min_reward = self.min_reward.min(episode_reward);
        self.max_reward = self.max_reward.max(episode_reward);
    }

    fn merge(&mut self, other: &EpisodeStats) {
        self.num_episodes += other.num_episodes;
        self.total_reward += other.total_reward;
        self.min_reward = self.min_reward.min(other.min_reward);
        self.max_reward = self.max_reward.max(other.max_reward);
    }
}

enum Command<P> {
    Collect { policy: Arc<P>, quota: usize },
    Shutdown,
}

struct WorkerReport {
    memory: Memory,
    stats: EpisodeStats,
}

struct WorkerHandle<P> {
    commands: Sender<Command<P>>,
    replies: Receiver<Result<WorkerReport, EnvError>>,
    thread: Option<JoinHandle<()>>,
}

/// State owned by one worker thread.
struct Worker<E> {
    id: usize,
    env: E,
    rng: fastrand::Rng,
    render: bool,
    mean_action: bool,
    max_episode_steps: usize,
}

impl<E: Env> Worker<E> {
    fn run<P: Policy>(mut self, commands: Receiver<Command<P>>, replies: Sender<Result<WorkerReport, EnvError>>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Collect { policy, quota } => {
                    let report = self.collect(&*policy, quota);
                    // release the snapshot before replying
                    drop(policy);
                    if replies.send(report).is_err() {
                        break;
                    }
                }
                Command::Shutdown => break,
            }
        }
    }

    /// Plays whole episodes until at least `quota` steps are stored.
    fn collect<P: Policy>(&mut self, policy: &P, quota: usize) -> Result<WorkerReport, EnvError> {
        let mut memory = Memory::with_capacity(quota);
        let mut stats = EpisodeStats::default();

        while memory.len() < quota {
            let mut state = self.env.reset()?;
            let mut episode_reward = 0.0;
            for t in 0..self.max_episode_steps {
                let action = policy.select_action(&state, &mut self.rng, self.mean_action);
                let step = self.env.step(&action)?;
                if self.render {
                    self.env.render();
                }
                episode_reward += step.reward;
                let last = step.done || t + 1 == self.max_episode_steps;
                let next_state = step.observation;
                memory.push(Transition {
                    state,
                    action,
                    mask: if last { 0.0 } else { 1.0 },
                    next_state: next_state.clone(),
                    reward: step.reward,
                });
                state = next_state;
                if last {
                    break;
                }
            }
            stats.record(episode_reward);
        }

        tracing::debug!(
            worker = self.id,
            steps = memory.len(),
            episodes = stats.num_episodes,
            reward = stats.total_reward,
            "collection finished"
        );
        Ok(WorkerReport { memory, stats })
    }
}

/// Fixed pool of collection workers.
pub struct Agent<P: Policy> {
    workers: Vec<WorkerHandle<P>>,
    observation_dim: usize,
    action_space: ActionSpace,
}

impl<P: Policy> Agent<P> {
    /// Builds one environment per worker with `make_env(worker_index)` and
    /// spawns the pool.
    pub fn new<E, F>(mut make_env: F, config: &AgentConfig) -> Result<Self, RlError>
    where
        E: Env + Send + 'static,
        F: FnMut(usize) -> Result<E, EnvError>,
    {
        if config.num_threads == 0 {
            return Err(ConfigError::invalid("num_threads", "must be at least 1").into());
        }
        if config.max_episode_steps == 0 {
            return Err(ConfigError::invalid("max_episode_steps", "must be at least 1").into());
        }

        let mut envs = Vec::with_capacity(config.num_threads);
        for i in 0..config.num_threads {
            envs.push(make_env(i)?);
        }
        let observation_dim = envs[0].observation_dim();
        let action_space = envs[0].action_space();

        let mut workers = Vec::with_capacity(envs.len());
        for (id, env) in envs.into_iter().enumerate() {
            let worker = Worker {
                id,
                env,
                rng: fastrand::Rng::with_seed(sampler_seed(config.seed, id)),
                render: config.render && id == 0,
                mean_action: config.mean_action,
                max_episode_steps: config.max_episode_steps,
            };
            let (command_tx, command_rx) = unbounded();
            let (reply_tx, reply_rx) = unbounded();
            let thread = thread::Builder::new()
                .name(format!("ppo-worker-{id}"))
                .spawn(move || worker.run(command_rx, reply_tx))
                .map_err(RlError::Spawn)?;
            workers.push(WorkerHandle { commands: command_tx, replies: reply_rx, thread: Some(thread) });
        }

        tracing::debug!(workers = workers.len(), observation_dim, ?action_space, "agent started");
        Ok(Self { workers, observation_dim, action_space })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub fn action_space(&self) -> ActionSpace {
        self.action_space
    }

    /// Fails unless `policy` reads this agent's observations and emits its
    /// actions.
    pub fn check_policy(&self, policy: &P) -> Result<(), RlError> {
        if policy.observation_dim() != self.observation_dim {
            return Err(RlError::LengthMismatch {
                what: "policy observation",
                expected: self.observation_dim,
                got: policy.observation_dim(),
            });
        }
        if policy.action_space() != self.action_space {
            return Err(ConfigError::invalid(
                "policy",
                format!("acts in {:?}, environment expects {:?}", policy.action_space(), self.action_space),
            )
            .into());
        }
        Ok(())
    }

    /// Collects at least `min_batch_size` transitions across all workers.
    ///
    /// Each worker gets `min_batch_size / n` steps and the last one also takes
    /// the remainder. Workers always finish their current episode, so the
    /// batch may be larger than requested. Every worker's clone of `policy` is
    /// dropped by the time this returns.
    pub fn collect_samples(&mut self, policy: &Arc<P>, min_batch_size: usize) -> Result<(Batch, CollectionLog), RlError> {
        self.check_policy(policy)?;

        let start = Instant::now();
        let n = self.workers.len();
        let per_worker = min_batch_size / n;
        let remainder = min_batch_size % n;

        let mut dispatched = Vec::with_capacity(n);
        for (i, worker) in self.workers.iter().enumerate() {
            let quota = if i + 1 == n { per_worker + remainder } else { per_worker };
            let command = Command::Collect { policy: Arc::clone(policy), quota };
            dispatched.push(worker.commands.send(command).is_ok());
        }

        // drain every dispatched reply before judging, so no stale report is left behind
        let results: Vec<Result<WorkerReport, RlError>> = self
            .workers
            .iter()
            .zip(dispatched)
            .enumerate()
            .map(|(i, (worker, sent))| {
                if !sent {
                    return Err(RlError::WorkerLost(i));
                }
                match worker.replies.recv() {
                    Ok(Ok(report)) => Ok(report),
                    Ok(Err(source)) => Err(RlError::Worker { worker: i, source }),
                    Err(_) => Err(RlError::WorkerLost(i)),
                }
            })
            .collect();

        let mut memory = Memory::new();
        let mut stats = EpisodeStats::default();
        for result in results {
            let mut report = result?;
            memory.append(&mut report.memory);
            stats.merge(&report.stats);
        }

        let batch = memory.sample()?;
        let (action_mean, action_min, action_max) = action_stats(&batch.actions);
        let (avg_reward, min_reward, max_reward) = if stats.num_episodes == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (stats.total_reward / stats.num_episodes as f32, stats.min_reward, stats.max_reward)
        };
        let log = CollectionLog {
            num_steps: batch.len(),
            num_episodes: stats.num_episodes,
            total_reward: stats.total_reward,
            avg_reward,
            min_reward,
            max_reward,
            sample_time: start.elapsed(),
            action_mean,
            action_min,
            action_max,
        };
        Ok((batch, log))
    }
}

impl<P: Policy> Drop for Agent<P> {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.commands.send(Command::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

/// Column-wise mean, min and max of a `[n, cols]` tensor.
fn action_stats(actions: &Tensor) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let cols = actions.cols();
    let rows = actions.rows();
    if rows == 0 {
        return (vec![0.0; cols], vec![0.0; cols], vec![0.0; cols]);
    }
    let mut sum = vec![0.0; cols];
    let mut min = vec![f32::INFINITY; cols];
    let mut max = vec![f32::NEG_INFINITY; cols];
    for r in 0..rows {
        for (c, &v) in actions.row(r).iter().enumerate() {
            sum[c] += v;
            min[c] = min[c].min(v);
            max[c] = max[c].max(v);
        }
    }
    let mean = sum.into_iter().map(|s| s / rows as f32).collect();
    (mean, min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_stats_per_column() {
        let actions = Tensor::from_vec(vec![3, 2], vec![1.0, -1.0, 3.0, 0.0, 2.0, 1.0]);
        let (mean, min, max) = action_stats(&actions);
        assert_eq!(mean, vec![2.0, 0.0]);
        assert_eq!(min, vec![1.0, -1.0]);
        assert_eq!(max, vec![3.0, 1.0]);
    }

    #[test]
    fn episode_stats_merge() {
        let mut a = EpisodeStats::default();
        a.record(2.0);
        let mut b = EpisodeStats::default();
        b.record(-1.0);
        b.record(5.0);
        a.merge(&b);
        assert_eq!(a.num_episodes, 3);
        assert_eq!(a.total_reward, 6.0);
        assert_eq!(a.min_reward, -1.0);
        assert_eq!(a.max_reward, 5.0);
    }
}
