mod common;

use common::{policy_for, value_for, FailingEnv, FixedLengthEnv, PanickingEnv, TwoStepEnv};
use ml::NoGrad;
use rl::{envs, estimate_advantages, sampler_seed, Action, Agent, AgentConfig, Env, EnvError, RlError};
use std::sync::Arc;

fn config(num_threads: usize) -> AgentConfig {
    AgentConfig { num_threads, seed: 3, ..Default::default() }
}

#[test]
fn two_step_env_is_reproducible() {
    let run = || {
        let mut agent = Agent::new(|_| Ok(TwoStepEnv::default()), &config(2)).unwrap();
        let policy = Arc::new(policy_for(&TwoStepEnv::default(), 11));
        let value = value_for(&TwoStepEnv::default(), 12);
        let (batch, log) = agent.collect_samples(&policy, 4).unwrap();
        let values = value.forward(&batch.states, &mut NoGrad);
        let adv = estimate_advantages(&batch.rewards, &batch.masks, &values.data, 0.99, 0.95).unwrap();
        (batch, log, adv)
    };

    let (batch, log, adv) = run();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch.masks, vec![1.0, 0.0, 1.0, 0.0]);
    assert_eq!(log.num_episodes, 2);
    assert_eq!(log.num_steps, 4);
    assert_eq!(batch.states.data, vec![0.0, 1.0, 0.0, 1.0]);

    let (batch2, _, adv2) = run();
    assert_eq!(batch.actions.data, batch2.actions.data);
    assert_eq!(batch.rewards, batch2.rewards);
    let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&adv.advantages), bits(&adv2.advantages));
    assert_eq!(bits(&adv.returns), bits(&adv2.returns));
}

#[test]
fn exact_multiple_of_episode_length_gives_exact_batch() {
    let mut agent = Agent::new(|_| Ok(FixedLengthEnv::new(5)), &config(2)).unwrap();
    let policy = Arc::new(policy_for(&FixedLengthEnv::new(5), 0));

    let (batch, log) = agent.collect_samples(&policy, 20).unwrap();
    assert_eq!(batch.len(), 20);
    assert_eq!(log.num_episodes, 4);
    assert_eq!(batch.actions.shape, vec![20, 1]);

    // quotas of 10 and 11: the second worker finishes a third episode
    let (batch, log) = agent.collect_samples(&policy, 21).unwrap();
    assert_eq!(batch.len(), 25);
    assert_eq!(log.num_episodes, 5);
    assert_eq!(*batch.masks.last().unwrap(), 0.0);
    assert_eq!(batch.num_episodes() * 5, batch.len());
}

#[test]
fn last_worker_takes_the_remainder() {
    let mut agent = Agent::new(|_| Ok(FixedLengthEnv::new(1)), &config(3)).unwrap();
    let policy = Arc::new(policy_for(&FixedLengthEnv::new(1), 0));
    let (batch, log) = agent.collect_samples(&policy, 7).unwrap();
    assert_eq!(batch.len(), 7);
    assert_eq!(log.num_episodes, 7);
    assert!(batch.masks.iter().all(|&m| m == 0.0));
}

#[test]
fn episodes_are_cut_at_the_step_cap() {
    let cfg = AgentConfig { num_threads: 1, max_episode_steps: 3, ..Default::default() };
    let mut agent = Agent::new(|_| Ok(FixedLengthEnv::new(1000)), &cfg).unwrap();
    let policy = Arc::new(policy_for(&FixedLengthEnv::new(1000), 0));
    let (batch, _) = agent.collect_samples(&policy, 6).unwrap();
    assert_eq!(batch.masks, vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
}

#[test]
fn workers_release_the_policy() {
    let mut agent = Agent::new(|_| Ok(TwoStepEnv::default()), &config(4)).unwrap();
    let mut policy = Arc::new(policy_for(&TwoStepEnv::default(), 0));
    agent.collect_samples(&policy, 16).unwrap();
    assert_eq!(Arc::strong_count(&policy), 1);
    assert!(Arc::get_mut(&mut policy).is_some());
}

#[test]
fn env_factory_sees_worker_indices() {
    let mut seen = Vec::new();
    let agent: Agent<rl::PolicyNet> = Agent::new(
        |i| {
            seen.push(i);
            Ok(TwoStepEnv::default())
        },
        &config(3),
    )
    .unwrap();
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(agent.num_workers(), 3);
}

#[test]
fn factory_error_aborts_construction() {
    let result: Result<Agent<rl::PolicyNet>, _> = Agent::new(
        |i| {
            if i == 1 {
                Err(EnvError::UnknownEnv("Nope-v0".into()))
            } else {
                Ok(TwoStepEnv::default())
            }
        },
        &config(2),
    );
    assert!(matches!(result, Err(RlError::Env(EnvError::UnknownEnv(_)))));
}

#[test]
fn env_error_fails_the_round() {
    let mut agent = Agent::new(
        |i| Ok(FailingEnv::new(if i == 1 { 2 } else { usize::MAX })),
        &AgentConfig { num_threads: 2, max_episode_steps: 4, ..Default::default() },
    )
    .unwrap();
    let policy = Arc::new(policy_for(&FailingEnv::new(0), 0));
    match agent.collect_samples(&policy, 8) {
        Err(RlError::Worker { worker: 1, source: EnvError::Simulation(_) }) => {}
        other => panic!("expected worker 1 failure, got {other:?}"),
    }
    assert_eq!(Arc::strong_count(&policy), 1);
}

#[test]
fn panicking_worker_is_reported_lost() {
    let mut agent = Agent::new(|_| Ok(PanickingEnv), &config(1)).unwrap();
    let policy = Arc::new(policy_for(&PanickingEnv, 0));
    assert!(matches!(agent.collect_samples(&policy, 1), Err(RlError::WorkerLost(0))));
}

#[test]
fn mismatched_policy_is_rejected() {
    let mut agent = Agent::new(|_| Ok(TwoStepEnv::default()), &config(1)).unwrap();
    let policy = Arc::new(policy_for(&FixedLengthEnv::new(2), 0));
    assert!(matches!(
        agent.collect_samples(&policy, 2),
        Err(RlError::LengthMismatch { what: "policy observation", .. })
    ));
}

#[test]
fn mean_action_collection_is_deterministic() {
    let cfg = AgentConfig { num_threads: 2, mean_action: true, render: true, ..Default::default() };
    let mut agent = Agent::new(|_| Ok(FixedLengthEnv::new(3)), &cfg).unwrap();
    let policy = Arc::new(policy_for(&FixedLengthEnv::new(3), 5));
    let (batch, log) = agent.collect_samples(&policy, 6).unwrap();
    // both workers replay the same deterministic episode
    assert_eq!(batch.actions.data[..3], batch.actions.data[3..]);
    assert_eq!(log.action_min.len(), 1);
    assert!(log.action_min[0] <= log.action_mean[0] && log.action_mean[0] <= log.action_max[0]);
    let first = policy.as_ref();
    let expected = rl::Policy::select_action(first, &[0.0, 1.0], &mut fastrand::Rng::with_seed(0), true);
    assert_eq!(expected, Action::Continuous(vec![batch.actions.data[0]]));
}

#[test]
fn zero_threads_is_a_config_error() {
    let result: Result<Agent<rl::PolicyNet>, _> = Agent::new(|_| Ok(TwoStepEnv::default()), &config(0));
    assert!(matches!(result, Err(RlError::Config(_))));
}

#[test]
fn sampler_stream_is_not_the_env_stream() {
    let base = 1;
    for worker in 0..4 {
        let mut env = envs::make(envs::PENDULUM, base + worker as u64).unwrap();
        let obs = env.reset().unwrap();

        // rebuild the pendulum start state from the sampler's first two draws
        let mut sampler = fastrand::Rng::with_seed(sampler_seed(base, worker));
        let theta = sampler.f32() * 2.0 * std::f32::consts::PI - std::f32::consts::PI;
        let theta_dot = sampler.f32() * 2.0 - 1.0;
        assert_ne!(obs, vec![theta.cos(), theta.sin(), theta_dot], "worker {worker}");

        let mut env_rng = fastrand::Rng::with_seed(base + worker as u64);
        let mut sampler = fastrand::Rng::with_seed(sampler_seed(base, worker));
        let env_draws: Vec<u64> = (0..8).map(|_| env_rng.u64(..)).collect();
        let sampler_draws: Vec<u64> = (0..8).map(|_| sampler.u64(..)).collect();
        assert_ne!(env_draws, sampler_draws, "worker {worker}");
    }
}
