use crate::error::MlError;
use crate::recorder::Recorder;
use crate::tensor::Tensor;
use std::fmt;
use std::str::FromStr;

/// Anything that owns trainable tensors.
///
/// `params` and `params_mut` must list the tensors in the same, stable order:
/// optimizers and checkpoints index parameters by position.
pub trait Module {
    fn params(&self) -> Vec<&Tensor>;
    fn params_mut(&mut self) -> Vec<&mut Tensor>;

    fn num_params(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }
}

/// A fully connected neural network layer.
#[derive(Clone, Debug)]
pub struct Dense {
    /// The weight matrix for the layer, `[out_dim, in_dim]`.
    pub w: Tensor,
    /// The bias vector for the layer.
    pub b: Tensor,
    /// The number of input dimensions.
    pub in_dim: usize,
    /// The number of output dimensions.
    pub out_dim: usize,
}

impl Dense {
    /// Creates a new `Dense` layer with the given weights and biases.
    #[must_use]
    pub fn new(weights: Vec<f32>, bias: Vec<f32>, in_d: usize, out_d: usize) -> Self {
        assert_eq!(weights.len(), in_d * out_d);
        assert_eq!(bias.len(), out_d);
        Self {
            w: Tensor::from_vec(vec![out_d, in_d], weights),
            b: Tensor::from_vec(vec![out_d], bias),
            in_dim: in_d,
            out_dim: out_d,
        }
    }

    /// Glorot-uniform weights, zero bias.
    pub fn random(in_d: usize, out_d: usize, rng: &mut fastrand::Rng) -> Self {
        let limit = (6.0 / (in_d + out_d) as f32).sqrt();
        let weights = (0..in_d * out_d)
            .map(|_| rng.f32() * 2.0 * limit - limit)
            .collect();
        Self::new(weights, vec![0.0; out_d], in_d, out_d)
    }

    /// Multiplies the weights by `w_scale` and zeroes the bias. Output heads
    /// start near zero this way.
    #[must_use]
    pub fn scaled(mut self, w_scale: f32) -> Self {
        self.w.data.iter_mut().for_each(|w| *w *= w_scale);
        self.b.data.iter_mut().for_each(|b| *b = 0.0);
        self
    }

    /// Performs the forward pass through the layer on a `[batch, in_dim]` input.
    pub fn forward(&self, x: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        let wx = self.w.matmul(x, recorder);
        wx.add_broadcast(&self.b, recorder)
    }
}

impl Module for Dense {
    fn params(&self) -> Vec<&Tensor> {
        vec![&self.w, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.w, &mut self.b]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, x: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        match self {
            Activation::Tanh => x.tanh(recorder),
            Activation::Relu => x.relu(recorder),
            Activation::Sigmoid => x.sigmoid(recorder),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(MlError::UnknownActivation(other.to_string())),
        }
    }
}

/// Stack of hidden `Dense` layers, each followed by the activation.
#[derive(Clone, Debug)]
pub struct Mlp {
    layers: Vec<Dense>,
    activation: Activation,
    in_dim: usize,
}

impl Mlp {
    pub fn new(
        in_dim: usize,
        hidden: &[usize],
        activation: Activation,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut last = in_dim;
        for &h in hidden {
            layers.push(Dense::random(last, h, rng));
            last = h;
        }
        Self { layers, activation, in_dim }
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Width of the last hidden layer, or the input width if there is none.
    pub fn out_dim(&self) -> usize {
        self.layers.last().map_or(self.in_dim, |l| l.out_dim)
    }

    pub fn hidden_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.out_dim).collect()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn forward(&self, x: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        let mut h = x.clone();
        for layer in &self.layers {
            let z = layer.forward(&h, recorder);
            h = self.activation.apply(&z, recorder);
        }
        h
    }
}

impl Module for Mlp {
    fn params(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(Module::params).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers.iter_mut().flat_map(Module::params_mut).collect()
    }
}
