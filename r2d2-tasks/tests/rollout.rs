use r2d2_physics::{PhysicsWorld, Simulation};
use r2d2_tasks::tasks::{BallRetrieval, BallRetrievalConfig};
use r2d2_tasks::{make_env, Command, EnvConfig, Task, TaskEnv, TaskKind};

fn rapier_env(kind: TaskKind, config: EnvConfig) -> TaskEnv<Box<dyn Task>> {
    let sim = PhysicsWorld::new(&config.physics());
    make_env(kind, Box::new(sim), config, None).unwrap()
}

#[test]
fn test_every_task_runs_on_rapier() {
    for kind in TaskKind::ALL {
        let mut env = rapier_env(kind, EnvConfig::default());
        let observation = env.reset(Some(11)).unwrap();
        assert!(observation.to_vec().iter().all(|v| v.is_finite()));

        let t = env.step(&Command::default()).unwrap();
        assert!(!t.terminated, "{kind} ended on its first step");

        let dt = env.world().dt;
        let command = Command::new(0.5, 0.0, 0.2);
        for step in 2..=30u32 {
            let t = env.step(&command).unwrap();
            assert!(t.reward.is_finite(), "{kind}: reward {}", t.reward);
            assert!(t.info.rewards.iter().all(|(_, v)| v.is_finite()));
            assert_eq!(t.info.steps, step);
            assert!((t.info.elapsed - step as f32 * dt).abs() < 1e-4);
            if t.done() {
                break;
            }
        }
    }
}

#[test]
fn test_reset_keeps_scene_size_on_rapier() {
    for kind in TaskKind::ALL {
        let mut env = rapier_env(kind, EnvConfig::default());
        env.reset(Some(1)).unwrap();
        for _ in 0..10 {
            env.step(&Command::new(1.0, 0.0, 0.0)).unwrap();
        }
        let bodies = env.world().sim.body_count();
        env.reset(Some(2)).unwrap();
        let after = env.world().sim.body_count();
        env.reset(Some(3)).unwrap();
        assert_eq!(env.world().sim.body_count(), after, "{kind}");
        // Conveyor items spawned mid-episode are cleared on reset.
        assert!(after <= bodies, "{kind}: {after} > {bodies}");
    }
}

#[test]
fn test_step_limit_truncates_on_rapier() {
    let config = EnvConfig {
        max_episode_steps: Some(5),
        ..EnvConfig::default()
    };
    let mut env = rapier_env(TaskKind::Soccer, config);
    env.reset(None).unwrap();
    let mut last = None;
    while !env.is_finished() {
        last = Some(env.step(&Command::default()).unwrap());
    }
    let last = last.unwrap();
    assert!(last.truncated);
    assert_eq!(last.info.steps, 5);
    assert!(last.info.success.is_some());
    assert!(env.step(&Command::default()).is_err());
}

#[test]
fn test_idle_robot_never_carries_the_ball_on_rapier() {
    let config = EnvConfig::default();
    let sim = PhysicsWorld::new(&config.physics());
    let mut env = TaskEnv::new(Box::new(sim), config, |world| {
        BallRetrieval::build(BallRetrievalConfig::default(), world)
    })
    .unwrap();

    for seed in 0..20 {
        env.reset(Some(seed)).unwrap();
        env.step(&Command::default()).unwrap();
        {
            let task = env.task();
            let sim = env.world().sim.as_ref();
            for &body in task.terrain() {
                assert!(
                    !sim.in_contact(task.ball(), body).unwrap(),
                    "seed {seed}: ball spawned touching {body}"
                );
            }
        }

        for _ in 0..120 {
            let t = env.step(&Command::default()).unwrap();
            assert_eq!(t.info.rewards.get("pickup_reward"), Some(0.0), "seed {seed}");
            if t.done() {
                break;
            }
        }
        assert!(!env.success().unwrap(), "seed {seed}");
    }
}
