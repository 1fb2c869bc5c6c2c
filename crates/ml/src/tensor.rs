use crate::graph::{EOp, Node};
use crate::recorder::Recorder;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Dense row-major `f32` tensor.
///
/// Every tensor carries a process-unique `id` that the tape uses to route
/// gradients. Cloning keeps the id, so a clone of a parameter still receives
/// that parameter's gradient.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub id: usize,
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl Tensor {
    #[must_use]
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {shape:?} does not hold {} elements",
            data.len()
        );
        Self { id: next_id(), data, shape }
    }

    #[must_use]
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self::from_vec(shape, vec![0.0; len])
    }

    /// `[n, 1]` tensor holding one value per row.
    #[must_use]
    pub fn column(data: Vec<f32>) -> Self {
        let n = data.len();
        Self::from_vec(vec![n, 1], data)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the leading dimension.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of elements in one row.
    pub fn cols(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let c = self.cols();
        &self.data[i * c..(i + 1) * c]
    }

    /// Gathers the given rows into a fresh, untracked tensor.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Tensor {
        let c = self.cols();
        let mut data = Vec::with_capacity(indices.len() * c);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        let mut shape = self.shape.clone();
        if shape.is_empty() {
            shape.push(indices.len());
        } else {
            shape[0] = indices.len();
        }
        Tensor::from_vec(shape, data)
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    fn map(&self, op: EOp, f: impl Fn(f32) -> f32, recorder: &mut impl Recorder) -> Tensor {
        let data = self.data.iter().map(|&v| f(v)).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        emit(recorder, op, &[self], &out);
        out
    }

    fn zip(
        &self,
        other: &Tensor,
        op: EOp,
        f: impl Fn(f32, f32) -> f32,
        recorder: &mut impl Recorder,
    ) -> Tensor {
        assert_eq!(self.len(), other.len(), "{op:?}: {:?} vs {:?}", self.shape, other.shape);
        let data = self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        emit(recorder, op, &[self, other], &out);
        out
    }

    pub fn add(&self, other: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        self.zip(other, EOp::Add, |a, b| a + b, recorder)
    }

    pub fn sub(&self, other: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        self.zip(other, EOp::Sub, |a, b| a - b, recorder)
    }

    pub fn mul(&self, other: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        self.zip(other, EOp::Mul, |a, b| a * b, recorder)
    }

    /// Element-wise minimum. Ties count as `self` for the gradient.
    pub fn min(&self, other: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        self.zip(other, EOp::Min, f32::min, recorder)
    }

    pub fn mul_scalar(&self, s: f32, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::MulScalar(s), |v| v * s, recorder)
    }

    pub fn add_scalar(&self, s: f32, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::AddScalar(s), |v| v + s, recorder)
    }

    pub fn square(&self, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::Square, |v| v * v, recorder)
    }

    pub fn exp(&self, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::Exp, f32::exp, recorder)
    }

    pub fn tanh(&self, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::Tanh, f32::tanh, recorder)
    }

    pub fn relu(&self, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::Relu, |v| v.max(0.0), recorder)
    }

    pub fn sigmoid(&self, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::Sigmoid, |v| 1.0 / (1.0 + (-v).exp()), recorder)
    }

    pub fn clamp(&self, min: f32, max: f32, recorder: &mut impl Recorder) -> Tensor {
        self.map(EOp::Clamp { min, max }, |v| v.clamp(min, max), recorder)
    }

    /// `self` is a `[out, in]` weight matrix, `x` a `[batch, in]` input.
    /// Returns `[batch, out]`.
    pub fn matmul(&self, x: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        assert_eq!(self.shape.len(), 2, "matmul weight must be 2-D, got {:?}", self.shape);
        let (out_dim, in_dim) = (self.shape[0], self.shape[1]);
        assert_eq!(x.cols(), in_dim, "matmul: input {:?} vs weight {:?}", x.shape, self.shape);
        let batch = x.rows();
        let mut y = vec![0.0f32; batch * out_dim];
        for k in 0..batch {
            let xr = &x.data[k * in_dim..(k + 1) * in_dim];
            for i in 0..out_dim {
                let wr = &self.data[i * in_dim..(i + 1) * in_dim];
                y[k * out_dim + i] = wr.iter().zip(xr).map(|(w, v)| w * v).sum();
            }
        }
        let out = Tensor::from_vec(vec![batch, out_dim], y);
        emit(recorder, EOp::MatMul, &[self, x], &out);
        out
    }

    /// Adds the `[dim]` vector `b` to every row of `self`.
    pub fn add_broadcast(&self, b: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        self.broadcast(b, EOp::AddBroadcast, |x, y| x + y, recorder)
    }

    /// Multiplies every row of `self` by the `[dim]` vector `b`.
    pub fn mul_broadcast(&self, b: &Tensor, recorder: &mut impl Recorder) -> Tensor {
        self.broadcast(b, EOp::MulBroadcast, |x, y| x * y, recorder)
    }

    fn broadcast(
        &self,
        b: &Tensor,
        op: EOp,
        f: impl Fn(f32, f32) -> f32,
        recorder: &mut impl Recorder,
    ) -> Tensor {
        let dim = self.cols();
        assert_eq!(b.len(), dim, "{op:?}: row of {:?} vs {:?}", self.shape, b.shape);
        let data = self
            .data
            .chunks(dim.max(1))
            .flat_map(|row| row.iter().zip(&b.data).map(|(&x, &y)| f(x, y)))
            .collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        emit(recorder, op, &[self, b], &out);
        out
    }

    /// Sums each row, giving `[rows, 1]`.
    pub fn sum_rows(&self, recorder: &mut impl Recorder) -> Tensor {
        let c = self.cols().max(1);
        let data = self.data.chunks(c).map(|row| row.iter().sum()).collect();
        let out = Tensor::from_vec(vec![self.rows(), 1], data);
        emit(recorder, EOp::SumRows, &[self], &out);
        out
    }

    pub fn reduce_sum(&self, recorder: &mut impl Recorder) -> Tensor {
        let out = Tensor::from_vec(vec![1], vec![self.data.iter().sum()]);
        emit(recorder, EOp::ReduceSum, &[self], &out);
        out
    }

    pub fn reduce_mean(&self, recorder: &mut impl Recorder) -> Tensor {
        assert!(!self.data.is_empty(), "reduce_mean of an empty tensor");
        let out = Tensor::from_vec(vec![1], vec![self.mean()]);
        emit(recorder, EOp::ReduceMean, &[self], &out);
        out
    }

    /// Row-wise log-softmax.
    pub fn log_softmax(&self, recorder: &mut impl Recorder) -> Tensor {
        let c = self.cols().max(1);
        let mut data = Vec::with_capacity(self.len());
        for row in self.data.chunks(c) {
            let m = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let lse = m + row.iter().map(|&v| (v - m).exp()).sum::<f32>().ln();
            data.extend(row.iter().map(|&v| v - lse));
        }
        let out = Tensor::from_vec(self.shape.clone(), data);
        emit(recorder, EOp::LogSoftmax, &[self], &out);
        out
    }

    /// Picks `self[k, indices[k]]` for every row, giving `[rows, 1]`.
    pub fn gather(&self, indices: &[usize], recorder: &mut impl Recorder) -> Tensor {
        let c = self.cols();
        assert_eq!(indices.len(), self.rows(), "gather: one index per row");
        let data = indices
            .iter()
            .enumerate()
            .map(|(k, &j)| {
                assert!(j < c, "gather index {j} out of range for {c} columns");
                self.data[k * c + j]
            })
            .collect();
        let out = Tensor::from_vec(vec![indices.len(), 1], data);
        emit(recorder, EOp::Gather(indices.to_vec()), &[self], &out);
        out
    }
}

fn emit(recorder: &mut impl Recorder, op: EOp, inputs: &[&Tensor], out: &Tensor) {
    if !recorder.is_tracking() {
        return;
    }
    let node = Node { op, a: inputs[0].id, b: inputs.get(1).map(|t| t.id), out: out.id };
    recorder.record(node, inputs, out);
}
