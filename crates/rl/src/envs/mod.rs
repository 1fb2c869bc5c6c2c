//! Built-in classic-control environments, looked up by their gym id.

mod cartpole;
mod mountain_car;
mod pendulum;

pub use cartpole::CartPole;
pub use mountain_car::MountainCarContinuous;
pub use pendulum::Pendulum;

use crate::env::{Action, ActionSpace, Env, Step};
use crate::error::EnvError;

pub const CARTPOLE: &str = "CartPole-v1";
pub const PENDULUM: &str = "Pendulum-v1";
pub const MOUNTAIN_CAR_CONTINUOUS: &str = "MountainCarContinuous-v0";

/// Every id accepted by [`make`].
pub const NAMES: [&str; 3] = [CARTPOLE, PENDULUM, MOUNTAIN_CAR_CONTINUOUS];

#[derive(Debug, Clone)]
pub enum GymEnv {
    CartPole(CartPole),
    Pendulum(Pendulum),
    MountainCarContinuous(MountainCarContinuous),
}

/// Builds the environment registered under `name`, seeding its generator.
pub fn make(name: &str, seed: u64) -> Result<GymEnv, EnvError> {
    match name {
        CARTPOLE => Ok(GymEnv::CartPole(CartPole::new(seed))),
        PENDULUM => Ok(GymEnv::Pendulum(Pendulum::new(seed))),
        MOUNTAIN_CAR_CONTINUOUS => Ok(GymEnv::MountainCarContinuous(MountainCarContinuous::new(seed))),
        other => Err(EnvError::UnknownEnv(other.to_string())),
    }
}

impl GymEnv {
    fn inner(&self) -> &dyn Env {
        match self {
            GymEnv::CartPole(e) => e,
            GymEnv::Pendulum(e) => e,
            GymEnv::MountainCarContinuous(e) => e,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Env {
        match self {
            GymEnv::CartPole(e) => e,
            GymEnv::Pendulum(e) => e,
            GymEnv::MountainCarContinuous(e) => e,
        }
    }
}

impl Env for GymEnv {
    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.inner_mut().reset()
    }

    fn step(&mut self, action: &Action) -> Result<Step, EnvError> {
        self.inner_mut().step(action)
    }

    fn observation_dim(&self) -> usize {
        self.inner().observation_dim()
    }

    fn action_space(&self) -> ActionSpace {
        self.inner().action_space()
    }

    fn render(&self) {
        self.inner().render();
    }
}
