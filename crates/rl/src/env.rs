use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// Shape of the actions an environment accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpace {
    /// Real-valued actions with `dim` components.
    Continuous { dim: usize },
    /// One of `n` discrete choices.
    Discrete { n: usize },
}

impl ActionSpace {
    /// Width of one action row in a batch: the dimension for continuous
    /// spaces, a single index column for discrete ones.
    pub fn columns(self) -> usize {
        match self {
            ActionSpace::Continuous { dim } => dim,
            ActionSpace::Discrete { .. } => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Continuous(Vec<f32>),
    Discrete(usize),
}

impl Action {
    /// Appends this action's batch row to `out`.
    pub fn write_row(&self, out: &mut Vec<f32>) {
        match self {
            Action::Continuous(v) => out.extend_from_slice(v),
            Action::Discrete(i) => out.push(*i as f32),
        }
    }

    pub fn columns(&self) -> usize {
        match self {
            Action::Continuous(v) => v.len(),
            Action::Discrete(_) => 1,
        }
    }
}

/// Result of one [`Env::step`].
#[derive(Clone, Debug)]
pub struct Step {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub done: bool,
}

/// Reinforcement learning environment trait.
///
/// Inspired by classic frameworks like OpenAI Gym, this trait defines the core
/// interface an environment must provide. Each call to [`step`] advances the
/// simulation by one action and returns the new observation vector, a reward
/// signal, and whether the episode has terminated.
///
/// [`step`]: Env::step
pub trait Env {
    /// Reset the environment to its starting state and return the initial
    /// observation vector.
    fn reset(&mut self) -> Result<Vec<f32>, EnvError>;

    /// Advance the environment by one action.
    fn step(&mut self, action: &Action) -> Result<Step, EnvError>;

    /// Size of the observation vector.
    fn observation_dim(&self) -> usize;

    fn action_space(&self) -> ActionSpace;

    /// Hook for visualising the current state. Headless by default.
    fn render(&self) {}
}

impl<E: Env + ?Sized> Env for Box<E> {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        (**self).step(action)
    }

    fn observation_dim(&self) -> usize {
        (**self).observation_dim()
    }

    fn action_space(&self) -> ActionSpace {
        (**self).action_space()
    }

    fn render(&self) {
        (**self).render();
    }
}

pub(crate) fn continuous_action(action: &Action, dim: usize) -> Result<&[f32], EnvError> {
    match action {
        Action::Continuous(v) if v.len() == dim => Ok(v),
        other => Err(EnvError::InvalidAction(format!(
            "expected a continuous action of dimension {dim}, got {other:?}"
        ))),
    }
}

pub(crate) fn discrete_action(action: &Action, n: usize) -> Result<usize, EnvError> {
    match action {
        Action::Discrete(i) if *i < n => Ok(*i),
        other => Err(EnvError::InvalidAction(format!(
            "expected a discrete action below {n}, got {other:?}"
        ))),
    }
}
