//! Under-powered car that must rock back and forth to climb a hill.

use crate::env::{continuous_action, Action, ActionSpace, Env, Step};
use crate::error::EnvError;

const MIN_POSITION: f32 = -1.2;
const MAX_POSITION: f32 = 0.6;
const MAX_SPEED: f32 = 0.07;
const GOAL_POSITION: f32 = 0.45;
const POWER: f32 = 0.0015;

pub const DEFAULT_MAX_STEPS: usize = 999;

#[derive(Debug, Clone)]
pub struct MountainCarContinuous {
    position: f32,
    velocity: f32,
    steps: usize,
    max_steps: usize,
    rng: fastrand::Rng,
}

impl MountainCarContinuous {
    pub fn new(seed: u64) -> Self {
        Self {
            position: -0.5,
            velocity: 0.0,
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
}

impl Env for MountainCarContinuous {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.position = self.rng.f32() * 0.2 - 0.6;
        self.velocity = 0.0;
        self.steps = 0;
        Ok(vec![self.position, self.velocity])
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        let raw = continuous_action(action, 1)?[0];
        if !raw.is_finite() {
            return Err(EnvError::InvalidAction(format!("non-finite force {raw}")));
        }
        let force = raw.clamp(-1.0, 1.0);

        self.velocity = (self.velocity + force * POWER - 0.0025 * (3.0 * self.position).cos())
            .clamp(-MAX_SPEED, MAX_SPEED);
        self.position = (self.position + self.velocity).clamp(MIN_POSITION, MAX_POSITION);
        if self.position <= MIN_POSITION && self.velocity < 0.0 {
            self.velocity = 0.0;
        }
        self.steps += 1;

        let reached = self.position >= GOAL_POSITION && self.velocity >= 0.0;
        let mut reward = -0.1 * force * force;
        if reached {
            reward += 100.0;
        }

        Ok(Step {
            observation: vec![self.position, self.velocity],
            reward,
            done: reached || self.steps >= self.max_steps,
        })
    }

    fn observation_dim(&self) -> usize {
        2
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Continuous { dim: 1 }
    }

    fn render(&self) {
        tracing::trace!(target: "render", step = self.steps, position = self.position, velocity = self.velocity, "mountain car");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_starts_in_the_valley() {
        let mut env = MountainCarContinuous::new(9);
        let obs = env.reset().unwrap();
        assert!((-0.6..=-0.4).contains(&obs[0]));
        assert_eq!(obs[1], 0.0);
    }

    #[test]
    fn rocking_reaches_the_goal() {
        let mut env = MountainCarContinuous::new(1);
        env.reset().unwrap();
        let mut last = None;
        for _ in 0..DEFAULT_MAX_STEPS {
            // push in the direction of motion
            let push = if env.velocity >= 0.0 { 1.0 } else { -1.0 };
            let step = env.step(&Action::Continuous(vec![push])).unwrap();
            if step.done {
                last = Some(step);
                break;
            }
        }
        let last = last.unwrap();
        assert!(last.reward > 90.0, "goal bonus missing: {}", last.reward);
        assert!(last.observation[0] >= GOAL_POSITION);
    }

    #[test]
    fn left_wall_stops_the_car() {
        let mut env = MountainCarContinuous::new(0);
        env.reset().unwrap();
        env.position = MIN_POSITION;
        env.velocity = -MAX_SPEED;
        let step = env.step(&Action::Continuous(vec![-1.0])).unwrap();
        assert_eq!(step.observation, vec![MIN_POSITION, 0.0]);
    }
}
