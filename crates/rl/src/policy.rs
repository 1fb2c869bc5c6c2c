//! Stochastic policies over continuous and discrete action spaces.

use crate::env::{Action, ActionSpace};
use crate::value::NetArch;
use ml::dist::{argmax, normal_log_density, sample_categorical, softmax, standard_normal};
use ml::{Activation, Dense, MlError, Mlp, Module, NoGrad, Recorder, Tensor};
use serde::{Deserialize, Serialize};

/// A parametric state-to-action distribution.
///
/// Collection workers call [`select_action`](Policy::select_action) through a
/// shared reference, so implementations must be `Send + Sync`. Training
/// differentiates [`log_prob`](Policy::log_prob) under a tape.
pub trait Policy: Module + Send + Sync + 'static {
    fn observation_dim(&self) -> usize;

    fn action_space(&self) -> ActionSpace;

    /// Samples an action for one state, or returns the distribution's mode
    /// when `mean_action` is set.
    fn select_action(&self, state: &[f32], rng: &mut fastrand::Rng, mean_action: bool) -> Action;

    /// Log-probability of each action row under its state row, `[n, 1]`.
    fn log_prob(&self, states: &Tensor, actions: &Tensor, recorder: &mut impl Recorder) -> Tensor;
}

/// Diagonal Gaussian whose mean comes from an MLP and whose log standard
/// deviation is a free, state-independent parameter.
#[derive(Clone, Debug)]
pub struct GaussianPolicy {
    body: Mlp,
    mean_head: Dense,
    log_std: Tensor,
}

impl GaussianPolicy {
    pub fn new(
        obs_dim: usize,
        action_dim: usize,
        hidden: &[usize],
        activation: Activation,
        log_std: f32,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let body = Mlp::new(obs_dim, hidden, activation, rng);
        let mean_head = Dense::random(body.out_dim(), action_dim, rng).scaled(0.1);
        Self {
            body,
            mean_head,
            log_std: Tensor::from_vec(vec![action_dim], vec![log_std; action_dim]),
        }
    }

    pub fn log_std(&self) -> &[f32] {
        self.log_std.data()
    }

    pub fn mean(&self, states: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        let h = self.body.forward(states, recorder);
        self.mean_head.forward(&h, recorder)
    }
}

impl Module for GaussianPolicy {
    fn params(&self) -> Vec<&Tensor> {
        let mut params = self.body.params();
        params.extend(self.mean_head.params());
        params.push(&self.log_std);
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.body.params_mut();
        params.extend(self.mean_head.params_mut());
        params.push(&mut self.log_std);
        params
    }
}

impl Policy for GaussianPolicy {
    fn observation_dim(&self) -> usize {
        self.body.in_dim()
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Continuous { dim: self.mean_head.out_dim }
    }

    fn select_action(&self, state: &[f32], rng: &mut fastrand::Rng, mean_action: bool) -> Action {
        let x = Tensor::from_vec(vec![1, state.len()], state.to_vec());
        let mean = self.mean(&x, &mut NoGrad);
        if mean_action {
            return Action::Continuous(mean.data);
        }
        let sample = mean
            .data
            .iter()
            .zip(self.log_std.data())
            .map(|(m, ls)| m + ls.exp() * standard_normal(rng))
            .collect();
        Action::Continuous(sample)
    }

    fn log_prob(&self, states: &Tensor, actions: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        let mean = self.mean(states, recorder);
        normal_log_density(actions, &mean, &self.log_std, recorder)
    }
}

/// Softmax distribution over `n` choices.
#[derive(Clone, Debug)]
pub struct CategoricalPolicy {
    body: Mlp,
    head: Dense,
}

impl CategoricalPolicy {
    pub fn new(obs_dim: usize, n: usize, hidden: &[usize], activation: Activation, rng: &mut fastrand::Rng) -> Self {
        let body = Mlp::new(obs_dim, hidden, activation, rng);
        let head = Dense::random(body.out_dim(), n, rng).scaled(0.1);
        Self { body, head }
    }

    pub fn logits(&self, states: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        let h = self.body.forward(states, recorder);
        self.head.forward(&h, recorder)
    }
}

impl Module for CategoricalPolicy {
    fn params(&self) -> Vec<&Tensor> {
        let mut params = self.body.params();
        params.extend(self.head.params());
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.body.params_mut();
        params.extend(self.head.params_mut());
        params
    }
}

impl Policy for CategoricalPolicy {
    fn observation_dim(&self) -> usize {
        self.body.in_dim()
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete { n: self.head.out_dim }
    }

    fn select_action(&self, state: &[f32], rng: &mut fastrand::Rng, mean_action: bool) -> Action {
        let x = Tensor::from_vec(vec![1, state.len()], state.to_vec());
        let logits = self.logits(&x, &mut NoGrad);
        if mean_action {
            return Action::Discrete(argmax(&logits.data));
        }
        Action::Discrete(sample_categorical(&softmax(&logits.data), rng))
    }

    fn log_prob(&self, states: &Tensor, actions: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        // indices are stored as whole floats in the single action column
        let indices: Vec<usize> = actions.data().iter().map(|&a| a as usize).collect();
        self.logits(states, recorder).log_softmax(recorder).gather(&indices, recorder)
    }
}

/// Everything needed to rebuild a policy's layers before loading weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyArch {
    #[serde(flatten)]
    pub net: NetArch,
    pub action_space: ActionSpace,
}

/// A policy whose distribution family follows the environment's action space.
#[derive(Clone, Debug)]
pub enum PolicyNet {
    Gaussian(GaussianPolicy),
    Categorical(CategoricalPolicy),
}

impl PolicyNet {
    /// Gaussian for continuous spaces, categorical for discrete ones.
    /// `log_std` only applies to the Gaussian.
    pub fn new(
        obs_dim: usize,
        action_space: ActionSpace,
        hidden: &[usize],
        activation: Activation,
        log_std: f32,
        rng: &mut fastrand::Rng,
    ) -> Self {
        match action_space {
            ActionSpace::Continuous { dim } => {
                PolicyNet::Gaussian(GaussianPolicy::new(obs_dim, dim, hidden, activation, log_std, rng))
            }
            ActionSpace::Discrete { n } => {
                PolicyNet::Categorical(CategoricalPolicy::new(obs_dim, n, hidden, activation, rng))
            }
        }
    }

    pub fn from_arch(arch: &PolicyArch, rng: &mut fastrand::Rng) -> Result<Self, MlError> {
        let activation = arch.net.activation()?;
        Ok(Self::new(arch.net.obs_dim, arch.action_space, &arch.net.hidden, activation, 0.0, rng))
    }

    pub fn arch(&self) -> PolicyArch {
        let body = match self {
            PolicyNet::Gaussian(p) => &p.body,
            PolicyNet::Categorical(p) => &p.body,
        };
        PolicyArch { net: NetArch::of(body), action_space: self.action_space() }
    }
}

impl Module for PolicyNet {
    fn params(&self) -> Vec<&Tensor> {
        match self {
            PolicyNet::Gaussian(p) => p.params(),
            PolicyNet::Categorical(p) => p.params(),
        }
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            PolicyNet::Gaussian(p) => p.params_mut(),
            PolicyNet::Categorical(p) => p.params_mut(),
        }
    }
}

impl Policy for PolicyNet {
    fn observation_dim(&self) -> usize {
        match self {
            PolicyNet::Gaussian(p) => p.observation_dim(),
            PolicyNet::Categorical(p) => p.observation_dim(),
        }
    }

    fn action_space(&self) -> ActionSpace {
        match self {
            PolicyNet::Gaussian(p) => p.action_space(),
            PolicyNet::Categorical(p) => p.action_space(),
        }
    }

    fn select_action(&self, state: &[f32], rng: &mut fastrand::Rng, mean_action: bool) -> Action {
        match self {
            PolicyNet::Gaussian(p) => p.select_action(state, rng, mean_action),
            PolicyNet::Categorical(p) => p.select_action(state, rng, mean_action),
        }
    }

    fn log_prob(&self, states: &Tensor, actions: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        match self {
            PolicyNet::Gaussian(p) => p.log_prob(states, actions, recorder),
            PolicyNet::Categorical(p) => p.log_prob(states, actions, recorder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml::dist::HALF_LN_2PI;

    #[test]
    fn gaussian_mean_action_is_deterministic() {
        let mut rng = fastrand::Rng::with_seed(0);
        let policy = GaussianPolicy::new(3, 2, &[8], Activation::Tanh, -0.5, &mut rng);
        let state = [0.1, -0.2, 0.3];
        let a = policy.select_action(&state, &mut rng, true);
        let b = policy.select_action(&state, &mut rng, true);
        assert_eq!(a, b);
        assert_eq!(a.columns(), 2);
        assert_eq!(policy.log_std(), &[-0.5, -0.5]);
    }

    #[test]
    fn gaussian_log_prob_at_mean() {
        let mut rng = fastrand::Rng::with_seed(1);
        let policy = GaussianPolicy::new(2, 1, &[4], Activation::Tanh, 0.0, &mut rng);
        let states = Tensor::from_vec(vec![1, 2], vec![0.5, 0.5]);
        let mean = policy.mean(&states, &mut NoGrad);
        let lp = policy.log_prob(&states, &mean, &mut NoGrad);
        assert_eq!(lp.shape, vec![1, 1]);
        assert!((lp.data[0] + HALF_LN_2PI).abs() < 1e-5);
    }

    #[test]
    fn categorical_log_probs_normalize() {
        let mut rng = fastrand::Rng::with_seed(2);
        let policy = CategoricalPolicy::new(2, 3, &[4], Activation::Relu, &mut rng);
        let states = Tensor::from_vec(vec![3, 2], vec![0.3, -0.1, 0.3, -0.1, 0.3, -0.1]);
        let actions = Tensor::column(vec![0.0, 1.0, 2.0]);
        let lp = policy.log_prob(&states, &actions, &mut NoGrad);
        let total: f32 = lp.data.iter().map(|l| l.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn policy_net_follows_action_space() {
        let mut rng = fastrand::Rng::with_seed(3);
        let discrete = PolicyNet::new(4, ActionSpace::Discrete { n: 2 }, &[8], Activation::Tanh, 0.0, &mut rng);
        assert!(matches!(discrete, PolicyNet::Categorical(_)));
        let continuous = PolicyNet::new(3, ActionSpace::Continuous { dim: 1 }, &[8], Activation::Tanh, 0.0, &mut rng);
        assert!(matches!(continuous, PolicyNet::Gaussian(_)));

        let arch = continuous.arch();
        let rebuilt = PolicyNet::from_arch(&arch, &mut rng).unwrap();
        assert_eq!(rebuilt.arch(), arch);
        assert_eq!(rebuilt.num_params(), continuous.num_params());
    }
}
