//! Classic cart-pole balancing task with a discrete push-left / push-right
//! action and the usual 500-step time limit.

use crate::env::{discrete_action, Action, ActionSpace, Env, Step};
use crate::error::EnvError;

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const TOTAL_MASS: f32 = CART_MASS + POLE_MASS;
/// Half the pole length.
const POLE_HALF_LENGTH: f32 = 0.5;
const POLE_MASS_LENGTH: f32 = POLE_MASS * POLE_HALF_LENGTH;
const FORCE_MAG: f32 = 10.0;
const TAU: f32 = 0.02;
const THETA_THRESHOLD: f32 = 12.0 * 2.0 * std::f32::consts::PI / 360.0;
const X_THRESHOLD: f32 = 2.4;

pub const DEFAULT_MAX_STEPS: usize = 500;

#[derive(Debug, Clone)]
pub struct CartPole {
    /// `[x, x_dot, theta, theta_dot]`
    state: [f32; 4],
    steps: usize,
    max_steps: usize,
    rng: fastrand::Rng,
}

impl CartPole {
    pub fn new(seed: u64) -> Self {
        Self {
            state: [0.0; 4],
            steps: 0,
            max_steps: DEFAULT_MAX_STEPS,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn state(&self) -> [f32; 4] {
        self.state
    }

    fn failed(&self) -> bool {
        let [x, _, theta, _] = self.state;
        !(-X_THRESHOLD..=X_THRESHOLD).contains(&x) || !(-THETA_THRESHOLD..=THETA_THRESHOLD).contains(&theta)
    }
}

impl Env for CartPole {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        for s in &mut self.state {
            *s = self.rng.f32() * 0.1 - 0.05;
        }
        self.steps = 0;
        Ok(self.state.to_vec())
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        let push = discrete_action(action, 2)?;
        let force = if push == 1 { FORCE_MAG } else { -FORCE_MAG };
        let [x, x_dot, theta, theta_dot] = self.state;
        let (sin, cos) = theta.sin_cos();

        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin - cos * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - POLE_MASS * cos * cos / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos / TOTAL_MASS;

        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        self.steps += 1;

        Ok(Step {
            observation: self.state.to_vec(),
            reward: 1.0,
            done: self.failed() || self.steps >= self.max_steps,
        })
    }

    fn observation_dim(&self) -> usize {
        4
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete { n: 2 }
    }

    fn render(&self) {
        let [x, _, theta, _] = self.state;
        tracing::trace!(target: "render", step = self.steps, x, theta, "cartpole");
    }
}
