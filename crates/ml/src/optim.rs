use crate::tape::Gradients;
use crate::Tensor;

/// Adam with bias correction folded into the step size.
///
/// Moment buffers are indexed by parameter position, so `step` must always be
/// given the same parameters in the same order.
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: u32,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(params: &[&Tensor], lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: params.iter().map(|p| vec![0.0; p.data.len()]).collect(),
            v: params.iter().map(|p| vec![0.0; p.data.len()]).collect(),
        }
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Changes the step size without touching the moment estimates.
    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    pub fn steps(&self) -> u32 {
        self.t
    }

    /// Parameters without a gradient are left untouched.
    pub fn step(&mut self, params: &mut [&mut Tensor], grads: &Gradients) {
        assert_eq!(params.len(), self.m.len(), "optimizer built for a different parameter set");
        self.t += 1;
        let t = i32::try_from(self.t).unwrap_or(i32::MAX);
        let lr_t = self.lr * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));

        for (i, p) in params.iter_mut().enumerate() {
            let Some(grad) = grads.get(p) else {
                continue;
            };
            for j in 0..p.data.len() {
                self.m[i][j] = self.beta1 * self.m[i][j] + (1.0 - self.beta1) * grad[j];
                self.v[i][j] = self.beta2 * self.v[i][j] + (1.0 - self.beta2) * grad[j].powi(2);
                p.data[j] -= lr_t * self.m[i][j] / (self.v[i][j].sqrt() + self.eps);
            }
        }
    }
}
