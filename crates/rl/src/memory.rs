use crate::env::Action;
use crate::error::RlError;
use ml::Tensor;

/// One environment step as seen by a collection worker.
#[derive(Clone, Debug)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: Action,
    /// `0.0` on the last step of an episode, `1.0` otherwise.
    pub mask: f32,
    pub next_state: Vec<f32>,
    pub reward: f32,
}

/// Append-only buffer of transitions in collection order.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    transitions: Vec<Transition>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { transitions: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Moves every transition of `other` to the end of this buffer.
    pub fn append(&mut self, other: &mut Memory) {
        self.transitions.append(&mut other.transitions);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transition> {
        self.transitions.iter()
    }

    /// Flattens the buffer into batch tensors.
    pub fn sample(&self) -> Result<Batch, RlError> {
        Batch::from_transitions(&self.transitions)
    }
}

impl<'a> IntoIterator for &'a Memory {
    type Item = &'a Transition;
    type IntoIter = std::slice::Iter<'a, Transition>;

    fn into_iter(self) -> Self::IntoIter {
        self.transitions.iter()
    }
}

/// Column-oriented view of a [`Memory`].
///
/// `states` is `[n, obs_dim]` and `actions` is `[n, columns]`, where discrete
/// actions occupy a single column holding the index.
#[derive(Clone, Debug)]
pub struct Batch {
    pub states: Tensor,
    pub actions: Tensor,
    pub rewards: Vec<f32>,
    pub masks: Vec<f32>,
}

impl Batch {
    pub fn from_transitions(transitions: &[Transition]) -> Result<Self, RlError> {
        let n = transitions.len();
        let obs_dim = transitions.first().map_or(0, |t| t.state.len());
        let act_cols = transitions.first().map_or(0, |t| t.action.columns());

        let mut states = Vec::with_capacity(n * obs_dim);
        let mut actions = Vec::with_capacity(n * act_cols);
        let mut rewards = Vec::with_capacity(n);
        let mut masks = Vec::with_capacity(n);

        for t in transitions {
            check_width("state", obs_dim, t.state.len())?;
            check_width("next_state", obs_dim, t.next_state.len())?;
            check_width("action", act_cols, t.action.columns())?;
            states.extend_from_slice(&t.state);
            t.action.write_row(&mut actions);
            rewards.push(t.reward);
            masks.push(t.mask);
        }

        Ok(Self {
            states: Tensor::from_vec(vec![n, obs_dim], states),
            actions: Tensor::from_vec(vec![n, act_cols], actions),
            rewards,
            masks,
        })
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Number of completed episodes, counted by terminal masks.
    pub fn num_episodes(&self) -> usize {
        self.masks.iter().filter(|&&m| m == 0.0).count()
    }
}

fn check_width(what: &'static str, expected: usize, got: usize) -> Result<(), RlError> {
    if expected == got {
        Ok(())
    } else {
        Err(RlError::LengthMismatch { what, expected, got })
    }
}
