use crate::error::MlError;
use crate::graph::{EOp, Node};
use crate::recorder::Recorder;
use crate::tensor::Tensor;
use std::collections::HashMap;

/// A tape that records operations for automatic differentiation.
///
/// The tape keeps a copy of every tensor an op touched, so gradients can be
/// computed after the forward values have gone out of scope.
#[derive(Default)]
pub struct Tape {
    nodes: Vec<Node>,
    values: HashMap<usize, Tensor>,
}

impl Recorder for Tape {
    fn record(&mut self, node: Node, inputs: &[&Tensor], out: &Tensor) {
        for t in inputs {
            self.values.entry(t.id).or_insert_with(|| (*t).clone());
        }
        self.values.insert(out.id, out.clone());
        self.nodes.push(node);
    }
}

/// Gradients keyed by tensor id.
#[derive(Debug, Default)]
pub struct Gradients {
    grads: HashMap<usize, Vec<f32>>,
}

impl Gradients {
    pub fn get(&self, tensor: &Tensor) -> Option<&[f32]> {
        self.grads.get(&tensor.id).map(Vec::as_slice)
    }

    /// L2 norm over the gradients of `params`.
    pub fn norm(&self, params: &[&Tensor]) -> f32 {
        params
            .iter()
            .filter_map(|p| self.get(p))
            .flat_map(|g| g.iter())
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }

    /// Rescales the gradients of `params` so their joint norm is at most
    /// `max_norm`. Returns the norm before clipping.
    pub fn clip_norm(&mut self, params: &[&Tensor], max_norm: f32) -> f32 {
        let total = self.norm(params);
        if total > max_norm {
            tracing::trace!(norm = total, max_norm, "clipping gradients");
            let scale = max_norm / (total + 1e-6);
            for p in params {
                if let Some(g) = self.grads.get_mut(&p.id) {
                    g.iter_mut().for_each(|v| *v *= scale);
                }
            }
        }
        total
    }
}

impl Tape {
    /// Creates a new, empty tape.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn value(&self, id: usize) -> Result<&Tensor, MlError> {
        self.values.get(&id).ok_or(MlError::MissingValue(id))
    }

    /// Computes the gradients of every recorded tensor with respect to `loss`.
    ///
    /// The gradients are computed by traversing the recorded operations in reverse order.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::NonScalarLoss`] if `loss` has more than one element.
    pub fn backward(&self, loss: &Tensor) -> Result<Gradients, MlError> {
        if loss.len() != 1 {
            return Err(MlError::NonScalarLoss(loss.shape.clone()));
        }
        let mut grads: HashMap<usize, Vec<f32>> = HashMap::new();
        grads.insert(loss.id, vec![1.0]);

        for node in self.nodes.iter().rev() {
            // Nodes that do not lead to the loss carry no gradient.
            let Some(out_grad) = grads.get(&node.out).cloned() else {
                continue;
            };
            let a = self.value(node.a)?;
            let b = match node.b {
                Some(id) => Some(self.value(id)?),
                None => None,
            };
            let out = self.value(node.out)?;
            let (ga, gb) = local_grads(&node.op, a, b, out, &out_grad)?;
            accumulate(&mut grads, node.a, ga);
            if let (Some(id), Some(g)) = (node.b, gb) {
                accumulate(&mut grads, id, g);
            }
        }

        Ok(Gradients { grads })
    }
}

fn accumulate(grads: &mut HashMap<usize, Vec<f32>>, id: usize, g: Vec<f32>) {
    match grads.get_mut(&id) {
        Some(acc) => acc.iter_mut().zip(&g).for_each(|(a, v)| *a += v),
        None => {
            grads.insert(id, g);
        }
    }
}

fn second<'a>(b: Option<&'a Tensor>, op: &EOp) -> Result<&'a Tensor, MlError> {
    b.ok_or_else(|| MlError::ShapeMismatch(format!("{op:?} recorded without a second operand")))
}

#[allow(clippy::too_many_lines)]
fn local_grads(
    op: &EOp,
    a: &Tensor,
    b: Option<&Tensor>,
    out: &Tensor,
    og: &[f32],
) -> Result<(Vec<f32>, Option<Vec<f32>>), MlError> {
    let elementwise = |f: &dyn Fn(usize) -> f32| (0..a.len()).map(f).collect::<Vec<f32>>();
    let grads = match op {
        EOp::Add => (og.to_vec(), Some(og.to_vec())),
        EOp::Sub => (og.to_vec(), Some(og.iter().map(|g| -g).collect())),
        EOp::Mul => {
            let b = second(b, op)?;
            (
                elementwise(&|i| b.data[i] * og[i]),
                Some(elementwise(&|i| a.data[i] * og[i])),
            )
        }
        EOp::Min => {
            let b = second(b, op)?;
            let take_a = |i: usize| a.data[i] <= b.data[i];
            (
                elementwise(&|i| if take_a(i) { og[i] } else { 0.0 }),
                Some(elementwise(&|i| if take_a(i) { 0.0 } else { og[i] })),
            )
        }
        EOp::MulScalar(s) => (og.iter().map(|g| g * s).collect(), None),
        EOp::AddScalar(_) => (og.to_vec(), None),
        EOp::Square => (elementwise(&|i| 2.0 * a.data[i] * og[i]), None),
        EOp::Exp => (elementwise(&|i| out.data[i] * og[i]), None),
        EOp::Tanh => (elementwise(&|i| (1.0 - out.data[i].powi(2)) * og[i]), None),
        EOp::Relu => (elementwise(&|i| if a.data[i] > 0.0 { og[i] } else { 0.0 }), None),
        EOp::Sigmoid => (elementwise(&|i| out.data[i] * (1.0 - out.data[i]) * og[i]), None),
        EOp::Clamp { min, max } => (
            elementwise(&|i| if a.data[i] >= *min && a.data[i] <= *max { og[i] } else { 0.0 }),
            None,
        ),
        EOp::MatMul => {
            let x = second(b, op)?;
            let (out_dim, in_dim) = (a.shape[0], a.shape[1]);
            let batch = x.rows();
            let mut w_grad = vec![0.0f32; a.len()];
            let mut x_grad = vec![0.0f32; x.len()];
            for k in 0..batch {
                for i in 0..out_dim {
                    let g = og[k * out_dim + i];
                    if g == 0.0 {
                        continue;
                    }
                    for j in 0..in_dim {
                        w_grad[i * in_dim + j] += g * x.data[k * in_dim + j];
                        x_grad[k * in_dim + j] += g * a.data[i * in_dim + j];
                    }
                }
            }
            (w_grad, Some(x_grad))
        }
        EOp::AddBroadcast => {
            let dim = second(b, op)?.len();
            let mut b_grad = vec![0.0f32; dim];
            for row in og.chunks(dim.max(1)) {
                b_grad.iter_mut().zip(row).for_each(|(acc, g)| *acc += g);
            }
            (og.to_vec(), Some(b_grad))
        }
        EOp::MulBroadcast => {
            let b = second(b, op)?;
            let dim = b.len();
            let mut a_grad = vec![0.0f32; a.len()];
            let mut b_grad = vec![0.0f32; dim];
            for (idx, g) in og.iter().enumerate() {
                let j = idx % dim;
                a_grad[idx] = g * b.data[j];
                b_grad[j] += g * a.data[idx];
            }
            (a_grad, Some(b_grad))
        }
        EOp::SumRows => {
            let c = a.cols().max(1);
            (elementwise(&|i| og[i / c]), None)
        }
        EOp::ReduceSum => (vec![og[0]; a.len()], None),
        EOp::ReduceMean => (vec![og[0] / a.len() as f32; a.len()], None),
        EOp::LogSoftmax => {
            let c = a.cols().max(1);
            let mut a_grad = vec![0.0f32; a.len()];
            for (k, row_grad) in og.chunks(c).enumerate() {
                let total: f32 = row_grad.iter().sum();
                for j in 0..c {
                    let idx = k * c + j;
                    a_grad[idx] = row_grad[j] - out.data[idx].exp() * total;
                }
            }
            (a_grad, None)
        }
        EOp::Gather(indices) => {
            let c = a.cols();
            let mut a_grad = vec![0.0f32; a.len()];
            for (k, &j) in indices.iter().enumerate() {
                a_grad[k * c + j] += og[k];
            }
            (a_grad, None)
        }
    };
    Ok(grads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_scalar_loss_is_rejected() {
        let tape = Tape::new();
        let loss = Tensor::from_vec(vec![2], vec![1.0, 2.0]);
        assert!(matches!(tape.backward(&loss), Err(MlError::NonScalarLoss(_))));
    }

    #[test]
    fn shared_input_accumulates() {
        let mut tape = Tape::new();
        let x = Tensor::from_vec(vec![2], vec![3.0, -1.0]);
        // d/dx sum(x * x + x) = 2x + 1
        let y = x.mul(&x, &mut tape).add(&x, &mut tape).reduce_sum(&mut tape);
        let grads = tape.backward(&y).unwrap();
        assert_eq!(grads.get(&x).unwrap(), &[7.0, -1.0]);
    }

    #[test]
    fn clip_norm_scales_down() {
        let mut tape = Tape::new();
        let x = Tensor::from_vec(vec![2], vec![3.0, 4.0]);
        let y = x.square(&mut tape).mul_scalar(0.5, &mut tape).reduce_sum(&mut tape);
        let mut grads = tape.backward(&y).unwrap();
        let before = grads.clip_norm(&[&x], 1.0);
        assert!((before - 5.0).abs() < 1e-5);
        assert!((grads.norm(&[&x]) - 1.0).abs() < 1e-4);
    }
}
