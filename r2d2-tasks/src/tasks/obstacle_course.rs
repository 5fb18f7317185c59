//! Descending obstacle course with a box to push into a goal (task_84).
//!
//! Platforms step down from -x to +x one level at a time. Ramps link the
//! levels, wall pairs flank the drops and a pillar stands on every level but
//! the last. The red box waits on the middle level and the goal pad lies on
//! the lowest one.

use nalgebra::Vector3;
use r2d2_physics::{BodyId, BodySpec, Pose, Shape, Velocity};
use serde::{Deserialize, Serialize};

use crate::env::World;
use crate::error::{ConfigError, TaskError};
use crate::robot::Command;
use crate::task::{EpisodeClock, Rewards, Task};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleCourseConfig {
    pub course_size: [f32; 3],
    pub num_levels: usize,
    pub platform_size: [f32; 3],
    pub ramp_size: [f32; 3],
    pub gap_size: f32,
    pub wall_size: [f32; 3],
    pub pillar_radius: f32,
    pub pillar_height: f32,
    pub box_size: f32,
    pub box_mass: f32,
    pub goal_size: [f32; 3],
    /// Robot start distance from the upper end of the course.
    pub start_inset: f32,
    pub time_limit: f32,
    pub reach_distance: f32,
    /// Box speed below which it counts as parked.
    pub settle_speed: f32,
    pub progression_scale: f32,
    pub reached_reward: f32,
    pub in_goal_reward: f32,
    pub collision_penalty: f32,
}

impl Default for ObstacleCourseConfig {
    fn default() -> Self {
        Self {
            course_size: [20.0, 20.0, 10.0],
            num_levels: 5,
            platform_size: [5.0, 5.0, 0.5],
            ramp_size: [5.0, 2.0, 1.0],
            gap_size: 2.0,
            wall_size: [2.0, 0.2, 2.0],
            pillar_radius: 0.5,
            pillar_height: 2.0,
            box_size: 1.0,
            box_mass: 1.0,
            goal_size: [2.0, 2.0, 0.01],
            start_inset: 1.0,
            time_limit: 300.0,
            reach_distance: 1.0,
            settle_speed: 0.1,
            progression_scale: 0.1,
            reached_reward: 10.0,
            in_goal_reward: 100.0,
            collision_penalty: -1.0,
        }
    }
}

impl ObstacleCourseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_levels < 2 {
            return Err(ConfigError::Mismatch {
                name: "num_levels",
                expected: 2,
                found: self.num_levels,
            });
        }
        Ok(())
    }

    pub fn level_height(&self) -> f32 {
        self.course_size[2] / self.num_levels as f32
    }

    /// Centre of the platform on level `i`, level 0 being the highest.
    pub fn platform_center(&self, i: usize) -> Vector3<f32> {
        let offset = i as f32 - self.num_levels as f32 / 2.0 + 0.5;
        Vector3::new(
            offset * self.platform_size[0],
            0.0,
            self.course_size[2] / 2.0 - self.level_height() * (i as f32 + 0.5),
        )
    }

    pub fn platform_top(&self, i: usize) -> f32 {
        self.platform_center(i).z + self.platform_size[2] / 2.0
    }

    pub fn goal_center(&self) -> Vector3<f32> {
        let last = self.platform_center(self.num_levels - 1);
        Vector3::new(
            last.x + self.platform_size[0] / 2.0 - self.goal_size[0] / 2.0,
            last.y,
            self.platform_top(self.num_levels - 1) + self.goal_size[2] / 2.0,
        )
    }

    fn box_start(&self) -> Pose {
        let middle = self.platform_center(self.num_levels / 2);
        Pose::at(
            middle.x,
            middle.y,
            self.platform_top(self.num_levels / 2) + self.box_size / 2.0,
        )
    }

    /// Falling below this means the robot has left the course.
    fn fall_z(&self) -> f32 {
        self.platform_center(self.num_levels - 1).z - self.level_height()
    }

    fn in_goal(&self, p: &Vector3<f32>) -> bool {
        let goal = self.goal_center();
        (p.x - goal.x).abs() < self.goal_size[0] / 2.0 && (p.y - goal.y).abs() < self.goal_size[1] / 2.0
    }
}

pub struct ObstacleCourse {
    config: ObstacleCourseConfig,
    clock: EpisodeClock,
    platforms: Vec<BodyId>,
    ramps: Vec<BodyId>,
    /// Walls and pillars; touching either costs.
    hazards: Vec<BodyId>,
    target_box: BodyId,
    previous_robot: Vector3<f32>,
    previous_distance: f32,
    reached: bool,
    delivered: bool,
}

impl ObstacleCourse {
    pub fn build(config: ObstacleCourseConfig, world: &mut World) -> Result<Self, TaskError> {
        config.validate()?;
        let half = |size: [f32; 3]| size.map(|v| v / 2.0);
        let levels = config.num_levels;
        let h = config.level_height();

        let mut platforms = Vec::with_capacity(levels);
        let mut ramps = Vec::new();
        let mut hazards = Vec::new();
        for i in 0..levels {
            let p = config.platform_center(i);
            platforms.push(world.sim.create_body(
                &BodySpec::cuboid(half(config.platform_size), p.into()).color([0.5, 0.5, 0.5, 1.0]),
            ));

            if i + 1 < levels {
                let ramp = [
                    p.x + config.platform_size[0] / 2.0 + config.ramp_size[0] / 2.0,
                    p.y,
                    p.z + h / 2.0 - config.ramp_size[2] / 2.0,
                ];
                ramps.push(world.sim.create_body(
                    &BodySpec::cuboid(half(config.ramp_size), ramp).color([0.6, 0.4, 0.2, 1.0]),
                ));

                let pillar = [
                    p.x,
                    p.y - config.platform_size[1] / 4.0,
                    p.z + h / 2.0 - config.pillar_height / 2.0,
                ];
                hazards.push(world.sim.create_body(
                    &BodySpec::cylinder(config.pillar_radius, config.pillar_height, pillar)
                        .color([0.8, 0.8, 0.8, 1.0]),
                ));
            }

            if i > 0 {
                let gap_x = p.x - config.platform_size[0] / 2.0 - config.gap_size / 2.0;
                let wall_x = gap_x - config.gap_size / 2.0 - config.wall_size[0] / 2.0;
                let wall_y = config.platform_size[1] / 2.0 + config.wall_size[1] / 2.0;
                for side in [-1.0, 1.0] {
                    hazards.push(world.sim.create_body(
                        &BodySpec::cuboid(
                            half(config.wall_size),
                            [wall_x, p.y + side * wall_y, p.z + config.wall_size[2] / 2.0],
                        )
                        .color([0.2, 0.2, 0.2, 1.0]),
                    ));
                }
            }
        }

        world.sim.create_body(
            &BodySpec::cuboid(half(config.goal_size), config.goal_center().into())
                .color([0.0, 1.0, 0.0, 1.0]),
        );
        let target_box = world.sim.create_body(
            &BodySpec::new(
                Shape::cuboid(
                    config.box_size / 2.0,
                    config.box_size / 2.0,
                    config.box_size / 2.0,
                ),
                config.box_start(),
            )
            .mass(config.box_mass)
            .color([1.0, 0.0, 0.0, 1.0]),
        );

        Ok(Self {
            clock: EpisodeClock::new(world.dt),
            platforms,
            ramps,
            hazards,
            target_box,
            previous_robot: Vector3::zeros(),
            previous_distance: f32::INFINITY,
            reached: false,
            delivered: false,
            config,
        })
    }

    pub fn config(&self) -> &ObstacleCourseConfig {
        &self.config
    }

    pub fn target_box(&self) -> BodyId {
        self.target_box
    }

    pub fn platforms(&self) -> &[BodyId] {
        &self.platforms
    }

    pub fn ramps(&self) -> &[BodyId] {
        &self.ramps
    }

    pub fn hazards(&self) -> &[BodyId] {
        &self.hazards
    }

    pub fn start_pose(&self, world: &World) -> Pose {
        let first = self.config.platform_center(0);
        Pose::at(
            first.x - self.config.platform_size[0] / 2.0 + self.config.start_inset,
            first.y,
            self.config.platform_top(0) + world.robot.start_height(),
        )
    }
}

impl Task for ObstacleCourse {
    fn name(&self) -> &'static str {
        "obstacle_course"
    }

    fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
        world.sim.set_pose(self.target_box, self.config.box_start())?;
        world.sim.set_velocity(self.target_box, Velocity::zero())?;
        let start = self.start_pose(world);
        world.place_robot(start)?;

        self.previous_robot = start.position;
        self.previous_distance = world.robot_distance_to(self.target_box)?;
        self.reached = false;
        self.delivered = false;
        Ok(())
    }

    fn before_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        self.previous_robot = world.robot_position()?;
        self.previous_distance = world.robot_distance_to(self.target_box)?;
        Ok(())
    }

    fn task_rewards(&mut self, world: &mut World, _command: &Command) -> Result<Rewards, TaskError> {
        let robot = world.robot_position()?;
        let distance = world.robot_distance_to(self.target_box)?;
        let box_position = world.sim.position(self.target_box)?;

        let forward = (robot.x - self.previous_robot.x) / world.dt;
        let elevation = robot.z / self.config.course_size[2];
        let progression = self.config.progression_scale * forward * elevation;

        let mut reached = 0.0;
        if !self.reached
            && distance < self.config.reach_distance
            && self.previous_distance >= self.config.reach_distance
        {
            self.reached = true;
            reached = self.config.reached_reward;
            log::debug!("robot reached the box");
        }

        let mut in_goal = 0.0;
        if !self.delivered && self.config.in_goal(&box_position) {
            self.delivered = true;
            in_goal = self.config.in_goal_reward;
            log::debug!("box pushed into the goal");
        }

        let mut collision = 0.0;
        for &hazard in &self.hazards {
            if world.robot_touching(hazard)? {
                collision += self.config.collision_penalty;
            }
        }

        Ok(Rewards::new()
            .with("forward_progression_reward", progression)
            .with("reached_target_object_reward", reached)
            .with("target_object_in_goal_reward", in_goal)
            .with("collision_penalty", collision))
    }

    fn terminated(&self, world: &World, _command: &Command) -> Result<bool, TaskError> {
        Ok(world.robot_position()?.z < self.config.fall_z()
            || world.robot_flipped()?
            || self.clock.elapsed() >= self.config.time_limit)
    }

    fn success(&self, world: &World) -> Result<bool, TaskError> {
        let box_position = world.sim.position(self.target_box)?;
        let box_speed = world.sim.velocity(self.target_box)?.linear.norm();
        Ok(self.config.in_goal(&box_position)
            && self.config.in_goal(&world.robot_position()?)
            && box_speed < self.config.settle_speed)
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

    fn env() -> TaskEnv<ObstacleCourse> {
        let config = EnvConfig::default();
        let sim = KinematicWorld::new(config.physics_dt);
        TaskEnv::new(Box::new(sim), config, |world| {
            ObstacleCourse::build(ObstacleCourseConfig::default(), world)
        })
        .unwrap()
    }

    #[test]
    fn test_layout_descends() {
        let config = ObstacleCourseConfig::default();
        let tops: Vec<f32> = (0..config.num_levels).map(|i| config.platform_top(i)).collect();
        assert!(tops.windows(2).all(|w| w[0] > w[1]));
        assert!((config.platform_center(0).x + 10.0).abs() < 1e-6);
        assert!(config.in_goal(&config.goal_center()));
    }

    #[test]
    fn test_scene_counts() {
        let env = env();
        let task = env.task();
        assert_eq!(task.platforms().len(), 5);
        assert_eq!(task.ramps().len(), 4);
        // four pillars and four wall pairs
        assert_eq!(task.hazards().len(), 12);
    }

    #[test]
    fn test_reaching_the_box_pays_once() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        let forward = Command::new(1.0, 0.0, 0.0);
        let place = |env: &mut TaskEnv<ObstacleCourse>| {
            let (task, world) = env.parts_mut();
            let target = world.sim.position(task.target_box()).unwrap();
            world
                .place_robot(Pose::at(target.x - 1.01, target.y, target.z))
                .unwrap();
        };

        place(&mut env);
        let t = env.step(&forward).unwrap();
        assert_eq!(t.info.rewards.get("reached_target_object_reward"), Some(10.0));

        place(&mut env);
        let t = env.step(&forward).unwrap();
        assert_eq!(t.info.rewards.get("reached_target_object_reward"), Some(0.0));
    }

    #[test]
    fn test_touching_a_pillar_costs() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        {
            let (task, world) = env.parts_mut();
            let pillar = world.sim.pose(task.hazards()[0]).unwrap();
            world.place_robot(pillar).unwrap();
        }
        let t = env.step(&Command::default()).unwrap();
        assert!(t.info.rewards.get("collision_penalty").unwrap() <= -1.0);
    }

    #[test]
    fn test_parked_box_and_robot_in_goal_succeed() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        {
            let (task, world) = env.parts_mut();
            let goal = task.config().goal_center();
            let half = task.config().box_size / 2.0;
            world
                .sim
                .set_pose(task.target_box(), Pose::at(goal.x, goal.y, goal.z + half))
                .unwrap();
            world
                .place_robot(Pose::at(goal.x + 0.5, goal.y, goal.z + world.robot.start_height()))
                .unwrap();
        }

        let t = env.step(&Command::default()).unwrap();
        assert_eq!(t.info.rewards.get("target_object_in_goal_reward"), Some(100.0));
        assert!(env.success().unwrap());

        let t = env.step(&Command::default()).unwrap();
        assert_eq!(t.info.rewards.get("target_object_in_goal_reward"), Some(0.0));
    }

    #[test]
    fn test_falling_off_the_course_terminates() {
        let mut env = env();
        env.reset(Some(0)).unwrap();
        let t = env.step(&Command::default()).unwrap();
        assert!(!t.terminated);

        env.parts_mut().1.place_robot(Pose::at(0.0, 15.0, -7.0)).unwrap();
        let t = env.step(&Command::default()).unwrap();
        assert!(t.terminated);
        assert_eq!(t.info.success, Some(false));
    }
}
