use rl::envs::{self, GymEnv, NAMES};
use rl::{Action, ActionSpace, Env, EnvError};

#[test]
fn registry_knows_every_name() {
    for name in NAMES {
        let mut env = envs::make(name, 0).unwrap();
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), env.observation_dim(), "{name}");
    }
}

#[test]
fn unknown_name_is_an_error() {
    assert!(matches!(envs::make("Hopper-v2", 0), Err(EnvError::UnknownEnv(name)) if name == "Hopper-v2"));
}

#[test]
fn spaces_match_the_classic_tasks() {
    let cartpole = envs::make(envs::CARTPOLE, 0).unwrap();
    assert!(matches!(cartpole, GymEnv::CartPole(_)));
    assert_eq!(cartpole.action_space(), ActionSpace::Discrete { n: 2 });
    assert_eq!(cartpole.observation_dim(), 4);

    let pendulum = envs::make(envs::PENDULUM, 0).unwrap();
    assert_eq!(pendulum.action_space(), ActionSpace::Continuous { dim: 1 });
    assert_eq!(pendulum.observation_dim(), 3);

    let car = envs::make(envs::MOUNTAIN_CAR_CONTINUOUS, 0).unwrap();
    assert_eq!(car.action_space(), ActionSpace::Continuous { dim: 1 });
    assert_eq!(car.observation_dim(), 2);
}

fn episode_length(name: &str, action: &Action) -> usize {
    let mut env = envs::make(name, 4).unwrap();
    env.reset().unwrap();
    let mut steps = 0;
    loop {
        steps += 1;
        if env.step(action).unwrap().done {
            return steps;
        }
    }
}

#[test]
fn time_limits() {
    assert_eq!(episode_length(envs::PENDULUM, &Action::Continuous(vec![0.0])), 200);
    // a car that never pushes stays in the valley
    assert_eq!(episode_length(envs::MOUNTAIN_CAR_CONTINUOUS, &Action::Continuous(vec![0.0])), 999);
    assert!(episode_length(envs::CARTPOLE, &Action::Discrete(0)) <= 500);
}

#[test]
fn seeds_make_resets_reproducible() {
    let mut a = envs::make(envs::PENDULUM, 42).unwrap();
    let mut b = envs::make(envs::PENDULUM, 42).unwrap();
    let mut c = envs::make(envs::PENDULUM, 43).unwrap();
    let first = a.reset().unwrap();
    assert_eq!(first, b.reset().unwrap());
    assert_ne!(first, c.reset().unwrap());
}
