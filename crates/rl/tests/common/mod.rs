#![allow(dead_code)]

use ml::Activation;
use rl::{Action, ActionSpace, Env, EnvError, PolicyNet, Step, ValueNet};

pub fn close(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() <= tol * b.abs().max(1.0)
}

/// Two steps per episode from a fixed start. Action 1 pays 1, action 0 pays 0.
#[derive(Clone, Debug, Default)]
pub struct TwoStepEnv {
    t: usize,
}

impl Env for TwoStepEnv {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.t = 0;
        Ok(vec![0.0])
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        let reward = match action {
            Action::Discrete(1) => 1.0,
            Action::Discrete(0) => 0.0,
            other => return Err(EnvError::InvalidAction(format!("{other:?}"))),
        };
        self.t += 1;
        Ok(Step { observation: vec![self.t as f32], reward, done: self.t == 2 })
    }

    fn observation_dim(&self) -> usize {
        1
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete { n: 2 }
    }
}

/// Episodes of exactly `len` steps with a one-dimensional continuous action.
#[derive(Clone, Debug)]
pub struct FixedLengthEnv {
    pub len: usize,
    t: usize,
}

impl FixedLengthEnv {
    pub fn new(len: usize) -> Self {
        Self { len, t: 0 }
    }
}

impl Env for FixedLengthEnv {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.t = 0;
        Ok(vec![0.0, 1.0])
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        let a = match action {
            Action::Continuous(v) if v.len() == 1 => v[0],
            other => return Err(EnvError::InvalidAction(format!("{other:?}"))),
        };
        self.t += 1;
        Ok(Step {
            observation: vec![self.t as f32 / self.len as f32, 1.0],
            reward: -a * a,
            done: self.t >= self.len,
        })
    }

    fn observation_dim(&self) -> usize {
        2
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Continuous { dim: 1 }
    }
}

/// Errors on the `fail_at`-th step of its first episode.
#[derive(Clone, Debug)]
pub struct FailingEnv {
    pub fail_at: usize,
    t: usize,
}

impl FailingEnv {
    pub fn new(fail_at: usize) -> Self {
        Self { fail_at, t: 0 }
    }
}

impl Env for FailingEnv {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        Ok(vec![0.0])
    }

    fn step(&mut self, _action: &Action) -> Result<Step, EnvError> {
        self.t += 1;
        if self.t == self.fail_at {
            return Err(EnvError::Simulation("solver diverged".into()));
        }
        Ok(Step { observation: vec![0.0], reward: 0.0, done: false })
    }

    fn observation_dim(&self) -> usize {
        1
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete { n: 2 }
    }
}

/// Panics on its first step.
#[derive(Clone, Debug, Default)]
pub struct PanickingEnv;

impl Env for PanickingEnv {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        Ok(vec![0.0])
    }

    fn step(&mut self, _action: &Action) -> Result<Step, EnvError> {
        panic!("physics exploded");
    }

    fn observation_dim(&self) -> usize {
        1
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete { n: 2 }
    }
}

pub fn policy_for(env: &impl Env, seed: u64) -> PolicyNet {
    let mut rng = fastrand::Rng::with_seed(seed);
    PolicyNet::new(env.observation_dim(), env.action_space(), &[16], Activation::Tanh, 0.0, &mut rng)
}

pub fn value_for(env: &impl Env, seed: u64) -> ValueNet {
    let mut rng = fastrand::Rng::with_seed(seed);
    ValueNet::new(env.observation_dim(), &[16], Activation::Tanh, &mut rng)
}
