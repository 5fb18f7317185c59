//! One-on-one soccer against a box opponent (task_60).
//!
//! The robot attacks the goal at +x and defends the one at -x. With
//! `opponent_speed` at zero the opponent just stands there; otherwise it
//! chases the ball.

use nalgebra::{Vector2, Vector3};
use r2d2_physics::{planar_distance, BodyId, BodySpec, Pose, Shape, Velocity};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::env::World;
use crate::error::TaskError;
use crate::robot::Command;
use crate::task::{EpisodeClock, Rewards, Task};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoccerConfig {
    pub field_size: [f32; 3],
    pub friction: f32,
    pub restitution: f32,
    pub ball_radius: f32,
    pub ball_mass: f32,
    pub goal_post_height: f32,
    pub goal_post_radius: f32,
    pub goal_width: f32,
    pub opponent_size: [f32; 3],
    pub opponent_mass: f32,
    /// Chase speed in m/s. Zero leaves the opponent standing.
    pub opponent_speed: f32,
    pub possession_distance: f32,
    pub max_steps: u32,
    pub possession_reward: f32,
    pub opponent_possession_penalty: f32,
    pub out_of_bounds_penalty: f32,
    pub robot_goal_reward: f32,
    pub opponent_goal_penalty: f32,
}

impl Default for SoccerConfig {
    fn default() -> Self {
        Self {
            field_size: [40.0, 20.0, 10.0],
            friction: 0.8,
            restitution: 0.5,
            ball_radius: 0.5,
            ball_mass: 1.0,
            goal_post_height: 2.0,
            goal_post_radius: 0.1,
            goal_width: 3.0,
            opponent_size: [0.5, 0.5, 1.0],
            opponent_mass: 1.0,
            opponent_speed: 0.0,
            possession_distance: 1.0,
            max_steps: 1000,
            possession_reward: 1.0,
            opponent_possession_penalty: -1.0,
            out_of_bounds_penalty: -1.0,
            robot_goal_reward: 10.0,
            opponent_goal_penalty: -10.0,
        }
    }
}

impl SoccerConfig {
    fn surface_z(&self) -> f32 {
        self.field_size[2] / 2.0
    }

    /// x of the goal line the robot attacks. The own goal mirrors it.
    fn goal_x(&self) -> f32 {
        self.field_size[0] / 2.0
    }

    fn ball_start(&self) -> Pose {
        Pose::at(0.0, 0.0, self.surface_z() + self.ball_radius)
    }

    fn in_goal_mouth(&self, ball: &Vector3<f32>) -> bool {
        ball.y.abs() < self.goal_width / 2.0
    }

    fn robot_scored(&self, ball: &Vector3<f32>) -> bool {
        self.in_goal_mouth(ball) && ball.x > self.goal_x()
    }

    fn opponent_scored(&self, ball: &Vector3<f32>) -> bool {
        self.in_goal_mouth(ball) && ball.x < -self.goal_x()
    }

    fn out_of_bounds(&self, ball: &Vector3<f32>) -> bool {
        ball.x.abs() > self.field_size[0] / 2.0 || ball.y.abs() > self.field_size[1] / 2.0
    }
}

pub struct Soccer {
    config: SoccerConfig,
    clock: EpisodeClock,
    ball: BodyId,
    opponent: BodyId,
    goal_posts: Vec<BodyId>,
    previous_ball: Vector3<f32>,
}

impl Soccer {
    pub fn build(config: SoccerConfig, world: &mut World) -> Result<Self, TaskError> {
        world.sim.create_body(
            &BodySpec::cuboid(config.field_size.map(|v| v / 2.0), [0.0; 3])
                .color([0.0, 0.5, 0.0, 1.0])
                .friction(config.friction)
                .restitution(config.restitution),
        );
        let ball_start = config.ball_start().position;
        let ball = world.sim.create_body(
            &BodySpec::sphere(config.ball_radius, ball_start.into())
                .mass(config.ball_mass)
                .color([1.0, 1.0, 1.0, 1.0]),
        );

        let post_z = config.surface_z() + config.goal_post_height / 2.0;
        let mut goal_posts = Vec::with_capacity(4);
        for (x, color) in [
            (config.goal_x(), [1.0, 0.0, 0.0, 1.0]),
            (-config.goal_x(), [0.0, 0.0, 1.0, 1.0]),
        ] {
            for side in [-1.0, 1.0] {
                goal_posts.push(world.sim.create_body(
                    &BodySpec::cylinder(
                        config.goal_post_radius,
                        config.goal_post_height,
                        [x, side * config.goal_width / 2.0, post_z],
                    )
                    .color(color),
                ));
            }
        }

        let opponent = world.sim.create_body(
            &BodySpec::new(
                Shape::cuboid(
                    config.opponent_size[0] / 2.0,
                    config.opponent_size[1] / 2.0,
                    config.opponent_size[2] / 2.0,
                ),
                Self::opponent_start(&config),
            )
            .mass(config.opponent_mass)
            .color([0.0, 0.0, 0.0, 1.0]),
        );

        Ok(Self {
            clock: EpisodeClock::new(world.dt),
            ball,
            opponent,
            goal_posts,
            previous_ball: ball_start,
            config,
        })
    }

    fn opponent_start(config: &SoccerConfig) -> Pose {
        Pose::at(
            config.field_size[0] / 4.0,
            0.0,
            config.surface_z() + config.opponent_size[2] / 2.0 + 0.01,
        )
        .with_yaw(PI)
    }

    pub fn config(&self) -> &SoccerConfig {
        &self.config
    }

    pub fn ball(&self) -> BodyId {
        self.ball
    }

    pub fn opponent(&self) -> BodyId {
        self.opponent
    }

    pub fn goal_posts(&self) -> &[BodyId] {
        &self.goal_posts
    }
}

impl Task for Soccer {
    fn name(&self) -> &'static str {
        "soccer"
    }

    fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
        let ball = self.config.ball_start();
        world.sim.set_pose(self.ball, ball)?;
        world.sim.set_velocity(self.ball, Velocity::zero())?;
        world
            .sim
            .set_pose(self.opponent, Self::opponent_start(&self.config))?;
        world.sim.set_velocity(self.opponent, Velocity::zero())?;
        world.place_robot(Pose::at(
            -self.config.field_size[0] / 4.0,
            0.0,
            self.config.surface_z() + world.robot.start_height(),
        ))?;
        self.previous_ball = ball.position;
        Ok(())
    }

    fn before_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        self.previous_ball = world.sim.position(self.ball)?;
        Ok(())
    }

    fn after_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        if self.config.opponent_speed <= 0.0 {
            return Ok(());
        }
        let ball = world.sim.position(self.ball)?;
        let opponent = world.sim.position(self.opponent)?;
        let current = world.sim.velocity(self.opponent)?;
        let towards = (ball - opponent).xy();
        let chase = towards
            .try_normalize(1e-6)
            .map(|direction| direction * self.config.opponent_speed)
            .unwrap_or_else(Vector2::zeros);
        world.sim.set_velocity(
            self.opponent,
            Velocity {
                linear: Vector3::new(chase.x, chase.y, current.linear.z),
                angular: current.angular,
            },
        )?;
        Ok(())
    }

    fn task_rewards(&mut self, world: &mut World, _command: &Command) -> Result<Rewards, TaskError> {
        let config = &self.config;
        let ball = world.sim.position(self.ball)?;
        let ball_velocity = world.sim.velocity(self.ball)?.linear;
        let robot = world.robot_position()?;
        let opponent = world.sim.position(self.opponent)?;

        let robot_near = planar_distance(&robot, &ball) < config.possession_distance;
        let opponent_near = planar_distance(&opponent, &ball) < config.possession_distance;

        let possession = if robot_near && !opponent_near {
            config.possession_reward
        } else {
            0.0
        };
        let opponent_possession = if opponent_near && !robot_near {
            config.opponent_possession_penalty
        } else {
            0.0
        };
        let ball_progress = (ball.x - self.previous_ball.x) / world.dt;
        let kick_velocity = if world.robot_touching(self.ball)? {
            ball_velocity.x
        } else {
            0.0
        };
        let out_of_bounds = if config.out_of_bounds(&ball) {
            config.out_of_bounds_penalty
        } else {
            0.0
        };
        let robot_goal = if config.robot_scored(&ball) {
            log::debug!("robot scored");
            config.robot_goal_reward
        } else {
            0.0
        };
        let opponent_goal = if config.opponent_scored(&ball) {
            log::debug!("opponent scored");
            config.opponent_goal_penalty
        } else {
            0.0
        };

        Ok(Rewards::new()
            .with("possession", possession)
            .with("ball_progress", ball_progress)
            .with("kick_velocity", kick_velocity)
            .with("opponent_possession", opponent_possession)
            .with("ball_out_of_bounds", out_of_bounds)
            .with("robot_goal", robot_goal)
            .with("opponent_goal", opponent_goal))
    }

    fn terminated(&self, world: &World, _command: &Command) -> Result<bool, TaskError> {
        let ball = world.sim.position(self.ball)?;
        Ok(self.config.robot_scored(&ball)
            || self.config.opponent_scored(&ball)
            || self.config.out_of_bounds(&ball)
            || self.clock.steps() >= self.config.max_steps)
    }

    fn success(&self, world: &World) -> Result<bool, TaskError> {
        let ball = world.sim.position(self.ball)?;
        Ok(self.config.robot_scored(&ball) && !self.config.opponent_scored(&ball))
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
    use r2d2_physics::KinematicWorld;

    fn env(config: SoccerConfig) -> TaskEnv<Soccer> {
        let env_config = EnvConfig::default();
        let sim = KinematicWorld::new(env_config.physics_dt);
        TaskEnv::new(Box::new(sim), env_config, |world| Soccer::build(config, world)).unwrap()
    }

    fn move_ball(env: &mut TaskEnv<Soccer>, x: f32, y: f32) {
        let (task, world) = env.parts_mut();
        let z = task.config().surface_z() + task.config().ball_radius;
        world.sim.set_pose(task.ball(), Pose::at(x, y, z)).unwrap();
    }

    #[test]
    fn test_kickoff_is_quiet() {
        let mut env = env(SoccerConfig::default());
        env.reset(Some(0)).unwrap();
        let t = env.step(&Command::default()).unwrap();
        assert!(!t.done());
        assert_eq!(t.reward, 0.0);
    }

    #[test]
    fn test_robot_goal_ends_in_success() {
        let mut env = env(SoccerConfig::default());
        env.reset(Some(0)).unwrap();
        move_ball(&mut env, 20.6, 0.5);
        let t = env.step(&Command::default()).unwrap();
        assert!(t.terminated);
        assert_eq!(t.info.rewards.get("robot_goal"), Some(10.0));
        assert_eq!(t.info.rewards.get("ball_out_of_bounds"), Some(-1.0));
        assert_eq!(t.info.success, Some(true));
    }

    #[test]
    fn test_own_goal_is_penalised() {
        let mut env = env(SoccerConfig::default());
        env.reset(Some(0)).unwrap();
        move_ball(&mut env, -20.6, 0.0);
        let t = env.step(&Command::default()).unwrap();
        assert!(t.terminated);
        assert_eq!(t.info.rewards.get("opponent_goal"), Some(-10.0));
        assert_eq!(t.info.success, Some(false));
    }

    #[test]
    fn test_wide_ball_is_out_of_bounds_only() {
        let mut env = env(SoccerConfig::default());
        env.reset(Some(0)).unwrap();
        move_ball(&mut env, 3.0, 10.6);
        let t = env.step(&Command::default()).unwrap();
        assert!(t.terminated);
        assert_eq!(t.info.rewards.get("ball_out_of_bounds"), Some(-1.0));
        assert_eq!(t.info.rewards.get("robot_goal"), Some(0.0));
    }

    #[test]
    fn test_possession_and_progress() {
        let mut env = env(SoccerConfig::default());
        env.reset(Some(0)).unwrap();
        move_ball(&mut env, -9.4, 0.0);
        {
            let (task, world) = env.parts_mut();
            world
                .sim
                .set_velocity(task.ball(), Velocity::linear(2.0, 0.0, 0.0))
                .unwrap();
        }
        let t = env.step(&Command::default()).unwrap();
        assert_eq!(t.info.rewards.get("possession"), Some(1.0));
        let progress = t.info.rewards.get("ball_progress").unwrap();
        assert!((progress - 2.0).abs() < 1e-3, "progress {progress}");
    }

    #[test]
    fn test_opponent_chases_the_ball() {
        let config = SoccerConfig {
            opponent_speed: 1.0,
            ..SoccerConfig::default()
        };
        let mut env = env(config);
        env.reset(Some(0)).unwrap();
        let opponent = env.task().opponent();
        let start = env.world().sim.position(opponent).unwrap();

        env.step(&Command::default()).unwrap();
        env.step(&Command::default()).unwrap();
        let now = env.world().sim.position(opponent).unwrap();
        assert!(now.x < start.x);
        assert!((now.y - start.y).abs() < 1e-6);
    }

    #[test]
    fn test_stationary_opponent_stays_put() {
        let mut env = env(SoccerConfig::default());
        env.reset(Some(0)).unwrap();
        let opponent = env.task().opponent();
        let start = env.world().sim.position(opponent).unwrap();
        for _ in 0..5 {
            env.step(&Command::default()).unwrap();
        }
        assert_eq!(env.world().sim.position(opponent).unwrap(), start);
    }
}
