use ml::{Activation, Dense, MlError, Mlp, Module, Recorder, Tensor};
use serde::{Deserialize, Serialize};

/// Layer layout of an MLP trunk, as stored in checkpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetArch {
    pub obs_dim: usize,
    pub hidden: Vec<usize>,
    pub activation: String,
}

impl NetArch {
    pub fn activation(&self) -> Result<Activation, MlError> {
        self.activation.parse()
    }

    pub(crate) fn of(body: &Mlp) -> Self {
        Self {
            obs_dim: body.in_dim(),
            hidden: body.hidden_sizes(),
            activation: body.activation().to_string(),
        }
    }
}

/// State-value estimator: an MLP trunk followed by a scalar head.
#[derive(Clone, Debug)]
pub struct ValueNet {
    body: Mlp,
    head: Dense,
}

impl ValueNet {
    pub fn new(obs_dim: usize, hidden: &[usize], activation: Activation, rng: &mut fastrand::Rng) -> Self {
        let body = Mlp::new(obs_dim, hidden, activation, rng);
        let head = Dense::random(body.out_dim(), 1, rng).scaled(0.1);
        Self { body, head }
    }

    pub fn from_arch(arch: &NetArch, rng: &mut fastrand::Rng) -> Result<Self, MlError> {
        Ok(Self::new(arch.obs_dim, &arch.hidden, arch.activation()?, rng))
    }

    pub fn arch(&self) -> NetArch {
        NetArch::of(&self.body)
    }

    /// `[n, obs_dim]` states to `[n, 1]` value estimates.
    pub fn forward(&self, states: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        let h = self.body.forward(states, recorder);
        self.head.forward(&h, recorder)
    }
}

impl Module for ValueNet {
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

#[cfg(test)]
mod tests {
    use super::*;
    use ml::NoGrad;

    #[test]
    fn forward_shape_and_arch() {
        let mut rng = fastrand::Rng::with_seed(0);
        let net = ValueNet::new(3, &[8, 4], Activation::Relu, &mut rng);
        let v = net.forward(&Tensor::zeros(vec![5, 3]), &mut NoGrad);
        assert_eq!(v.shape, vec![5, 1]);
        assert_eq!(net.arch(), NetArch { obs_dim: 3, hidden: vec![8, 4], activation: "relu".into() });
        assert_eq!(net.params().len(), 6);
    }
}
