//! Torque-controlled inverted pendulum swing-up.

use crate::env::{continuous_action, Action, ActionSpace, Env, Step};
use crate::error::EnvError;
use std::f32::consts::PI;

const MAX_SPEED: f32 = 8.0;
const MAX_TORQUE: f32 = 2.0;
const DT: f32 = 0.05;
const G: f32 = 10.0;
const M: f32 = 1.0;
const L: f32 = 1.0;

pub const DEFAULT_MAX_STEPS: usize = 200;

#[derive(Debug, Clone)]
pub struct Pendulum {
    theta: f32,
    theta_dot: f32,
    steps: usize,
    max_steps: usize,
    rng: fastrand::Rng,
}

/// Wraps an angle into `[-π, π)`.
fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Pendulum {
    pub fn new(seed: u64) -> Self {
        Self {
            theta: 0.0,
            theta_dot: 0.0,
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

    fn observation(&self) -> Vec<f32> {
        vec![self.theta.cos(), self.theta.sin(), self.theta_dot]
    }
}

impl Env for Pendulum {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.theta = self.rng.f32() * 2.0 * PI - PI;
        self.theta_dot = self.rng.f32() * 2.0 - 1.0;
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        let u = continuous_action(action, 1)?[0];
        if !u.is_finite() {
            return Err(EnvError::InvalidAction(format!("non-finite torque {u}")));
        }
        let u = u.clamp(-MAX_TORQUE, MAX_TORQUE);
        let th = self.theta;
        let cost = angle_normalize(th).powi(2) + 0.1 * self.theta_dot.powi(2) + 0.001 * u * u;

        let theta_dot = (self.theta_dot + (3.0 * G / (2.0 * L) * th.sin() + 3.0 / (M * L * L) * u) * DT)
            .clamp(-MAX_SPEED, MAX_SPEED);
        self.theta = th + theta_dot * DT;
        self.theta_dot = theta_dot;
        self.steps += 1;

        Ok(Step {
            observation: self.observation(),
            reward: -cost,
            done: self.steps >= self.max_steps,
        })
    }

    fn observation_dim(&self) -> usize {
        3
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Continuous { dim: 1 }
    }

    fn render(&self) {
        tracing::trace!(target: "render", step = self.steps, theta = self.theta, theta_dot = self.theta_dot, "pendulum");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_wraps() {
        assert!((angle_normalize(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!((angle_normalize(0.3) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn upright_and_still_costs_nothing() {
        let mut env = Pendulum::new(0);
        env.reset().unwrap();
        env.theta = 0.0;
        env.theta_dot = 0.0;
        let step = env.step(&Action::Continuous(vec![0.0])).unwrap();
        assert_eq!(step.reward, 0.0);
        assert_eq!(step.observation, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn runs_for_exactly_the_time_limit() {
        let mut env = Pendulum::new(3);
        env.reset().unwrap();
        for i in 1..=DEFAULT_MAX_STEPS {
            let step = env.step(&Action::Continuous(vec![5.0])).unwrap();
            assert!(step.reward <= 0.0);
            assert!(step.observation[2].abs() <= MAX_SPEED);
            assert_eq!(step.done, i == DEFAULT_MAX_STEPS);
        }
    }

    #[test]
    fn rejects_wrong_action_shape() {
        let mut env = Pendulum::new(0);
        env.reset().unwrap();
        assert!(env.step(&Action::Continuous(vec![0.0, 1.0])).is_err());
        assert!(env.step(&Action::Discrete(0)).is_err());
        assert!(env.step(&Action::Continuous(vec![f32::NAN])).is_err());
    }
}
