use nalgebra::Vector3;
use r2d2_physics::{BodyId, Pose, SimError, Simulation};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::EnvConfig;
use crate::error::{ConfigError, TaskError};
use crate::robot::{Command, Observation, Robot};
use crate::task::{Rewards, Task};
use crate::urdf::{RobotSpec, BASE_LINK};

/// Everything a task hook may touch.
pub struct World {
    pub sim: Box<dyn Simulation>,
    pub robot: Robot,
    pub rng: StdRng,
    /// Simulated seconds per control step
    pub dt: f32,
}

impl World {
    pub fn new(mut sim: Box<dyn Simulation>, config: &EnvConfig) -> Result<Self, TaskError> {
        let spec = match &config.robot.urdf_path {
            Some(path) => {
                let urdf = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                RobotSpec::from_urdf(&urdf, BASE_LINK)?
            }
            None => RobotSpec::r2d2()?,
        };
        let robot = Robot::spawn(sim.as_mut(), spec, config.robot.clone());
        let dt = sim.timestep() * config.substeps.max(1) as f32;
        Ok(Self {
            sim,
            robot,
            rng: StdRng::seed_from_u64(config.seed),
            dt,
        })
    }

    pub fn robot_pose(&self) -> Result<Pose, SimError> {
        self.robot.pose(self.sim.as_ref())
    }

    pub fn robot_position(&self) -> Result<Vector3<f32>, SimError> {
        self.robot.position(self.sim.as_ref())
    }

    pub fn place_robot(&mut self, pose: Pose) -> Result<(), SimError> {
        self.robot.place(self.sim.as_mut(), pose)
    }

    pub fn robot_touching(&self, other: BodyId) -> Result<bool, SimError> {
        self.robot.touching(self.sim.as_ref(), other)
    }

    pub fn robot_flipped(&self) -> Result<bool, SimError> {
        self.robot.is_flipped(self.sim.as_ref())
    }

    /// Planar distance from the robot to a body.
    pub fn robot_distance_to(&self, other: BodyId) -> Result<f32, SimError> {
        Ok(self.robot_pose()?.planar_distance(&self.sim.pose(other)?))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StepInfo {
    pub rewards: Rewards,
    pub elapsed: f32,
    pub steps: u32,
    /// Set once the episode has ended.
    pub success: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct Transition {
    pub observation: Observation,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

impl Transition {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Gym-style driver around one task and its world.
pub struct TaskEnv<T: Task> {
    task: T,
    world: World,
    config: EnvConfig,
    command: Command,
    finished: bool,
    episodes: u64,
}

impl<T: Task> TaskEnv<T> {
    /// Spawn the robot into `sim` and let `build` lay out the task's
    /// static scene. Call [`reset`](Self::reset) before stepping.
    pub fn new<F>(sim: Box<dyn Simulation>, config: EnvConfig, build: F) -> Result<Self, TaskError>
    where
        F: FnOnce(&mut World) -> Result<T, TaskError>,
    {
        let mut world = World::new(sim, &config)?;
        let task = build(&mut world)?;
        log::info!(
            "built task '{}' with {} bodies, control dt {:.4}s",
            task.name(),
            world.sim.body_count(),
            world.dt
        );
        Ok(Self {
            task,
            world,
            config,
            command: Command::default(),
            finished: true,
            episodes: 0,
        })
    }

    pub fn reset(&mut self, seed: Option<u64>) -> Result<Observation, TaskError> {
        if let Some(seed) = seed {
            self.world.rng = StdRng::seed_from_u64(seed);
        }
        self.task.clock_mut().restart(self.world.dt);
        self.task.reset(&mut self.world)?;
        self.command = Command::default();
        self.finished = false;
        self.episodes += 1;
        log::debug!("episode {} of '{}' started", self.episodes, self.task.name());
        Ok(self.world.robot.observe(self.world.sim.as_ref())?)
    }

    pub fn step(&mut self, command: &Command) -> Result<Transition, TaskError> {
        if self.finished {
            return Err(TaskError::EpisodeFinished);
        }

        let mut target = *command;
        target.clamp();
        self.command.lerp(&target, self.config.command_smoothing.clamp(0.0, 1.0));
        let command = self.command;

        self.task.before_step(&mut self.world)?;
        self.world.robot.apply(self.world.sim.as_mut(), &command)?;
        for _ in 0..self.config.substeps.max(1) {
            self.world.sim.step();
        }
        self.task.clock_mut().tick();
        self.task.after_step(&mut self.world)?;

        let rewards = self.task.task_rewards(&mut self.world, &command)?;
        let terminated = self.task.terminated(&self.world, &command)?;
        let steps = self.task.clock().steps();
        let truncated = !terminated
            && self
                .config
                .max_episode_steps
                .is_some_and(|limit| steps >= limit);

        self.finished = terminated || truncated;
        let success = if self.finished {
            let success = self.task.success(&self.world)?;
            log::info!(
                "episode {} of '{}' ended after {} steps ({}), success={}",
                self.episodes,
                self.task.name(),
                steps,
                if terminated { "terminated" } else { "truncated" },
                success
            );
            Some(success)
        } else {
            None
        };

        Ok(Transition {
            observation: self.world.robot.observe(self.world.sim.as_ref())?,
            reward: rewards.total(),
            terminated,
            truncated,
            info: StepInfo {
                rewards,
                elapsed: self.task.clock().elapsed(),
                steps,
                success,
            },
        })
    }

    pub fn success(&self) -> Result<bool, TaskError> {
        self.task.success(&self.world)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct access for scripted scenarios.
    pub fn parts_mut(&mut self) -> (&mut T, &mut World) {
        (&mut self.task, &mut self.world)
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::EpisodeClock;
    use r2d2_physics::{BodySpec, KinematicWorld};

    /// Robot on a slab; ends when it has driven past `finish_x` or after 10 steps.
    struct Drive {
        clock: EpisodeClock,
        slab: BodyId,
        crate_id: Option<BodyId>,
        finish_x: f32,
    }

    impl Drive {
        fn build(world: &mut World) -> Result<Self, TaskError> {
            let slab = world
                .sim
                .create_body(&BodySpec::cuboid([5.0, 5.0, 0.1], [0.0, 0.0, -0.1]));
            Ok(Self {
                clock: EpisodeClock::new(world.dt),
                slab,
                crate_id: None,
                finish_x: 0.1,
            })
        }
    }

    impl Task for Drive {
        fn name(&self) -> &'static str {
            "drive"
        }

        fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
            if let Some(id) = self.crate_id.take() {
                world.sim.remove_body(id)?;
            }
            self.crate_id = Some(
                world
                    .sim
                    .create_body(&BodySpec::cuboid([0.2; 3], [3.0, 0.0, 0.2]).mass(1.0)),
            );
            let z = world.robot.start_height();
            world.place_robot(Pose::at(0.0, 0.0, z))?;
            Ok(())
        }

        fn task_rewards(&mut self, world: &mut World, _: &Command) -> Result<Rewards, TaskError> {
            let x = world.robot_position()?.x;
            Ok(Rewards::new().with("progress", x).with("alive", 1.0))
        }

        fn terminated(&self, world: &World, _: &Command) -> Result<bool, TaskError> {
            Ok(world.robot_position()?.x > self.finish_x || self.clock.steps() >= 10)
        }

        fn success(&self, world: &World) -> Result<bool, TaskError> {
            Ok(world.robot_position()?.x > self.finish_x && world.sim.contains(self.slab))
        }

        fn clock(&self) -> &EpisodeClock {
            &self.clock
        }

        fn clock_mut(&mut self) -> &mut EpisodeClock {
            &mut self.clock
        }
    }

    fn env(config: EnvConfig) -> TaskEnv<Drive> {
        let sim = KinematicWorld::new(config.physics_dt);
        TaskEnv::new(Box::new(sim), config, Drive::build).unwrap()
    }

    #[test]
    fn test_step_before_reset_is_rejected() {
        let mut env = env(EnvConfig::default());
        assert!(matches!(
            env.step(&Command::default()),
            Err(TaskError::EpisodeFinished)
        ));
    }

    #[test]
    fn test_clock_advances_by_control_dt() {
        let config = EnvConfig::default();
        let dt = config.control_dt();
        let mut env = env(config);
        env.reset(Some(3)).unwrap();

        let mut last = 0.0;
        for step in 1..=5 {
            let t = env.step(&Command::default()).unwrap();
            assert_eq!(t.info.steps, step);
            assert!((t.info.elapsed - last - dt).abs() < 1e-6);
            assert!(!t.done());
            last = t.info.elapsed;
        }
    }

    #[test]
    fn test_step_limit_terminates_and_blocks_further_steps() {
        let mut env = env(EnvConfig::default());
        env.reset(None).unwrap();

        let mut last = None;
        for _ in 0..10 {
            last = Some(env.step(&Command::default()).unwrap());
        }
        let last = last.unwrap();
        assert!(last.terminated);
        assert!(!last.truncated);
        assert_eq!(last.info.success, Some(false));
        assert!(matches!(
            env.step(&Command::default()),
            Err(TaskError::EpisodeFinished)
        ));
    }

    #[test]
    fn test_max_episode_steps_truncates() {
        let config = EnvConfig {
            max_episode_steps: Some(3),
            ..EnvConfig::default()
        };
        let mut env = env(config);
        env.reset(None).unwrap();
        env.step(&Command::default()).unwrap();
        env.step(&Command::default()).unwrap();
        let t = env.step(&Command::default()).unwrap();
        assert!(t.truncated && !t.terminated);
        assert_eq!(t.info.success, Some(false));
    }

    #[test]
    fn test_driving_forward_succeeds() {
        let mut env = env(EnvConfig::default());
        env.reset(None).unwrap();

        let mut t = env.step(&Command::new(1.0, 0.0, 0.0)).unwrap();
        while !t.done() {
            t = env.step(&Command::new(1.0, 0.0, 0.0)).unwrap();
        }
        assert!(t.terminated);
        assert_eq!(t.info.success, Some(true));
        assert!(t.observation.linear_velocity[0] > 0.0);
        assert_eq!(t.info.rewards.get("alive"), Some(1.0));
        assert!((t.reward - t.info.rewards.total()).abs() < 1e-6);
    }

    #[test]
    fn test_reset_keeps_body_count_stable() {
        let mut env = env(EnvConfig::default());
        env.reset(None).unwrap();
        let count = env.world().sim.body_count();
        for seed in 0..3 {
            env.reset(Some(seed)).unwrap();
            assert_eq!(env.world().sim.body_count(), count);
        }
        assert!(!env.is_finished());
    }

    #[test]
    fn test_command_smoothing_blends_towards_target() {
        let config = EnvConfig {
            command_smoothing: 0.5,
            ..EnvConfig::default()
        };
        let max_speed = config.robot.max_speed;
        let mut env = env(config);
        env.reset(None).unwrap();
        let t = env.step(&Command::new(1.0, 0.0, 0.0)).unwrap();
        assert!((t.observation.linear_velocity[0] - 0.5 * max_speed).abs() < 1e-5);
    }
}
