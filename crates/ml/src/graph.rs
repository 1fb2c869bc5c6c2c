use crate::recorder::Recorder;
use crate::tensor::Tensor;

/// Differentiable operations understood by [`crate::tape::Tape`].
#[derive(Clone, Debug, PartialEq)]
pub enum EOp {
    Add,
    Sub,
    Mul,
    MulScalar(f32),
    AddScalar(f32),
    Square,
    Exp,
    Tanh,
    Relu,
    Sigmoid,
    Clamp { min: f32, max: f32 },
    Min,
    MatMul,
    AddBroadcast,
    MulBroadcast,
    SumRows,
    ReduceSum,
    ReduceMean,
    LogSoftmax,
    Gather(Vec<usize>),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub op: EOp,
    pub a: usize,
    pub b: Option<usize>,
    pub out: usize,
}

/// Recorder that keeps nothing.
///
/// Forward passes evaluated under `NoGrad` produce plain values that can never
/// be differentiated: rollouts, value targets and the old log-probabilities of
/// a PPO iteration all go through here.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoGrad;

impl Recorder for NoGrad {
    fn record(&mut self, _node: Node, _inputs: &[&Tensor], _out: &Tensor) {}

    fn is_tracking(&self) -> bool {
        false
    }
}
