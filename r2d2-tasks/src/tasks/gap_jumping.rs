//! Jumping over gaps (task_197).

use r2d2_physics::{BodySpec, Pose};
use serde::{Deserialize, Serialize};

use crate::env::World;
use crate::error::{ConfigError, TaskError};
use crate::robot::Command;
use crate::task::{EpisodeClock, Rewards, Task};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapJumpingConfig {
    pub platform_size: [f32; 3],
    pub friction: f32,
    pub restitution: f32,
    pub gap_widths: Vec<f32>,
    /// Centre x of each gap, paired with `gap_widths`.
    pub gap_positions: Vec<f32>,
    /// Start distance from the near edge of the platform.
    pub start_offset: f32,
    pub survival_reward: f32,
    pub gap_reward: f32,
    pub end_reward: f32,
}

impl Default for GapJumpingConfig {
    fn default() -> Self {
        Self {
            platform_size: [10.0, 10.0, 0.1],
            friction: 0.8,
            restitution: 0.5,
            gap_widths: vec![0.5, 0.5, 0.5, 1.0, 1.0, 1.5],
            gap_positions: vec![1.5, 3.5, 5.5, 8.0, 11.0, 15.0],
            start_offset: 0.5,
            survival_reward: 1.0,
            gap_reward: 1.0,
            end_reward: 10.0,
        }
    }
}

impl GapJumpingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gap_widths.len() != self.gap_positions.len() {
            return Err(ConfigError::Mismatch {
                name: "gap_widths/gap_positions",
                expected: self.gap_positions.len(),
                found: self.gap_widths.len(),
            });
        }
        Ok(())
    }

    /// The robot has made it once x passes this.
    pub fn end_x(&self) -> f32 {
        self.platform_size[0] / 2.0
    }

    fn surface_z(&self) -> f32 {
        self.platform_size[2] / 2.0
    }
}

pub struct GapJumping {
    config: GapJumpingConfig,
    clock: EpisodeClock,
    /// Gaps already paid out this episode.
    crossed: Vec<bool>,
    previous_x: f32,
}

impl GapJumping {
    pub fn build(config: GapJumpingConfig, world: &mut World) -> Result<Self, TaskError> {
        config.validate()?;
        let half = config.platform_size.map(|v| v / 2.0);
        world.sim.create_body(
            &BodySpec::cuboid(half, [0.0, 0.0, 0.0])
                .friction(config.friction)
                .restitution(config.restitution),
        );

        // Markers only; they sit flush with the platform surface.
        for (&width, &x) in config.gap_widths.iter().zip(&config.gap_positions) {
            world.sim.create_body(
                &BodySpec::cuboid([width / 2.0, half[1], half[2]], [x, 0.0, config.surface_z()])
                    .color([0.0, 0.0, 0.0, 1.0]),
            );
        }

        Ok(Self {
            crossed: vec![false; config.gap_positions.len()],
            clock: EpisodeClock::new(world.dt),
            previous_x: 0.0,
            config,
        })
    }

    pub fn config(&self) -> &GapJumpingConfig {
        &self.config
    }

    pub fn gaps_crossed(&self) -> usize {
        self.crossed.iter().filter(|c| **c).count()
    }

    pub fn start_pose(&self, world: &World) -> Pose {
        Pose::at(
            -self.config.platform_size[0] / 2.0 + self.config.start_offset,
            0.0,
            self.config.surface_z() + world.robot.start_height(),
        )
    }
}

impl Task for GapJumping {
    fn name(&self) -> &'static str {
        "gap_jumping"
    }

    fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
        self.crossed.iter_mut().for_each(|c| *c = false);
        let start = self.start_pose(world);
        world.place_robot(start)?;
        self.previous_x = start.position.x;
        Ok(())
    }

    fn before_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        self.previous_x = world.robot_position()?.x;
        Ok(())
    }

    fn task_rewards(&mut self, world: &mut World, _command: &Command) -> Result<Rewards, TaskError> {
        let x = world.robot_position()?.x;

        let mut gap_reward = 0.0;
        for (gap_x, crossed) in self.config.gap_positions.iter().zip(self.crossed.iter_mut()) {
            if !*crossed && self.previous_x < *gap_x && x >= *gap_x {
                *crossed = true;
                gap_reward += self.config.gap_reward;
                log::debug!("cleared gap at x={gap_x}");
            }
        }

        let end_reward = if x > self.config.end_x() {
            self.config.end_reward
        } else {
            0.0
        };

        Ok(Rewards::new()
            .with("survival", self.config.survival_reward)
            .with("gap_reward", gap_reward)
            .with("end_reward", end_reward))
    }

    fn terminated(&self, world: &World, _command: &Command) -> Result<bool, TaskError> {
        let position = world.robot_position()?;
        Ok(position.z < 0.0 || world.robot_flipped()? || position.x > self.config.end_x())
    }

    fn success(&self, world: &World) -> Result<bool, TaskError> {
        Ok(world.robot_position()?.x > self.config.end_x())
    }

    fn clock(&self) -> &EpisodeClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut EpisodeClock {
        &mut self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::env::TaskEnv;
    use nalgebra::{UnitQuaternion, Vector3};
    use r2d2_physics::KinematicWorld;

    fn env() -> TaskEnv<GapJumping> {
        let config = EnvConfig::default();
        let sim = KinematicWorld::new(config.physics_dt);
        TaskEnv::new(Box::new(sim), config, |world| {
            GapJumping::build(GapJumpingConfig::default(), world)
        })
        .unwrap()
    }

    fn place_at_x(env: &mut TaskEnv<GapJumping>, x: f32) {
        let (task, world) = env.parts_mut();
        let mut pose = task.start_pose(world);
        pose.position.x = x;
        world.place_robot(pose).unwrap();
    }

    #[test]
    fn test_gap_pays_once_per_episode() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        let forward = Command::new(1.0, 0.0, 0.0);

        place_at_x(&mut env, 1.49);
        let t = env.step(&forward).unwrap();
        assert_eq!(t.info.rewards.get("gap_reward"), Some(1.0));
        assert_eq!(t.info.rewards.get("survival"), Some(1.0));

        place_at_x(&mut env, 1.49);
        let t = env.step(&forward).unwrap();
        assert_eq!(t.info.rewards.get("gap_reward"), Some(0.0));
        assert_eq!(env.task().gaps_crossed(), 1);

        env.reset(Some(0)).unwrap();
        place_at_x(&mut env, 1.49);
        let t = env.step(&forward).unwrap();
        assert_eq!(t.info.rewards.get("gap_reward"), Some(1.0));
    }

    #[test]
    fn test_standing_still_earns_only_survival() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        let t = env.step(&Command::default()).unwrap();
        assert!(!t.done());
        assert_eq!(t.reward, 1.0);
    }

    #[test]
    fn test_reaching_the_end_succeeds() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        place_at_x(&mut env, 4.99);

        let t = env.step(&Command::new(1.0, 0.0, 0.0)).unwrap();
        assert!(t.terminated);
        assert_eq!(t.info.rewards.get("end_reward"), Some(10.0));
        assert_eq!(t.info.success, Some(true));
    }

    #[test]
    fn test_flipping_terminates() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        {
            let (_, world) = env.parts_mut();
            let tipped = Pose::new(
                Vector3::new(0.0, 0.0, 0.3),
                UnitQuaternion::from_euler_angles(std::f32::consts::PI, 0.0, 0.0),
            );
            world.place_robot(tipped).unwrap();
        }
        let t = env.step(&Command::default()).unwrap();
        assert!(t.terminated);
        assert_eq!(t.info.success, Some(false));
    }

    #[test]
    fn test_mismatched_gap_lists_are_rejected() {
        let config = GapJumpingConfig {
            gap_widths: vec![0.5],
            ..GapJumpingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
