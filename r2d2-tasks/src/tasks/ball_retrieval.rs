//! Outdoor ball retrieval (task_90).
//!
//! A field with a hill, a stream, loose patches and scattered obstacles,
//! all regenerated every episode. The robot has to find the ball, lift it
//! and bring it home. A ball that ends up far from both its spawn point and
//! the robot is put somewhere new.

use std::f32::consts::TAU;

use nalgebra::Vector3;
use r2d2_physics::{planar_distance, BodyId, BodySpec, Pose, Shape, Velocity};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{check_range, sample};
use crate::env::World;
use crate::error::{ConfigError, TaskError};
use crate::robot::Command;
use crate::task::{EpisodeClock, Rewards, Task};

// Obstacle and ball placement give up looking for open ground after this
// many draws.
const PLACEMENT_ATTEMPTS: usize = 16;

// Extra gap kept between a spawned ball and any terrain footprint.
const SPAWN_MARGIN: f32 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallRetrievalConfig {
    pub field_size: [f32; 2],
    pub ground_thickness: f32,
    pub friction: f32,
    pub restitution: f32,
    pub ball_radius: f32,
    pub ball_mass: f32,
    /// Spawn distance from the start, drawn at a random bearing.
    pub ball_distance: [f32; 2],
    pub lost_distance: f32,
    pub success_distance: f32,
    /// Height above resting on the ground that counts as lifted. The ball
    /// must also be clear of the ground and every terrain body.
    pub lift_margin: f32,
    pub time_limit: f32,
    pub hill_half_extents: [f32; 3],
    pub hill_position: [f32; 2],
    pub stream_half_extents: [f32; 3],
    pub stream_position: [f32; 2],
    pub num_patches: usize,
    pub patch_radius: f32,
    pub patch_height: f32,
    pub num_obstacles: usize,
    pub obstacle_radius: [f32; 2],
    pub obstacle_height: [f32; 2],
    /// Obstacles keep this far from the start.
    pub start_clearance: f32,
    pub explore_scale: f32,
    pub pickup_reward: f32,
    pub return_reward: f32,
    pub drop_penalty: f32,
}

impl Default for BallRetrievalConfig {
    fn default() -> Self {
        Self {
            field_size: [50.0, 50.0],
            ground_thickness: 0.2,
            friction: 0.8,
            restitution: 0.2,
            ball_radius: 0.25,
            ball_mass: 1.0,
            ball_distance: [10.0, 20.0],
            lost_distance: 5.0,
            success_distance: 2.0,
            lift_margin: 0.05,
            time_limit: 600.0,
            hill_half_extents: [10.0, 10.0, 2.5],
            hill_position: [15.0, 15.0],
            stream_half_extents: [2.5, 25.0, 0.25],
            stream_position: [-15.0, 0.0],
            num_patches: 10,
            patch_radius: 3.0,
            patch_height: 0.1,
            num_obstacles: 20,
            obstacle_radius: [0.5, 1.0],
            obstacle_height: [1.0, 2.0],
            start_clearance: 2.0,
            explore_scale: 0.1,
            pickup_reward: 10.0,
            return_reward: 100.0,
            drop_penalty: -1.0,
        }
    }
}

impl BallRetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("ball_distance", self.ball_distance)?;
        check_range("obstacle_radius", self.obstacle_radius)?;
        check_range("obstacle_height", self.obstacle_height)?;
        Ok(())
    }

    fn half_field(&self) -> [f32; 2] {
        [self.field_size[0] / 2.0, self.field_size[1] / 2.0]
    }
}

pub struct BallRetrieval {
    config: BallRetrievalConfig,
    clock: EpisodeClock,
    ground: BodyId,
    ball: BodyId,
    terrain: Vec<BodyId>,
    start: Vector3<f32>,
    ball_spawn: Vector3<f32>,
    previous_distance: f32,
    respawn_pending: bool,
    returned: bool,
    respawns: u32,
}

impl BallRetrieval {
    pub fn build(config: BallRetrievalConfig, world: &mut World) -> Result<Self, TaskError> {
        config.validate()?;
        let [hx, hy] = config.half_field();
        let ground = world.sim.create_body(
            &BodySpec::cuboid(
                [hx, hy, config.ground_thickness / 2.0],
                [0.0, 0.0, -config.ground_thickness / 2.0],
            )
            .friction(config.friction)
            .restitution(config.restitution),
        );
        let ball = world.sim.create_body(
            &BodySpec::sphere(config.ball_radius, [0.0, 0.0, config.ball_radius])
                .mass(config.ball_mass)
                .color([1.0, 1.0, 1.0, 1.0]),
        );

        Ok(Self {
            clock: EpisodeClock::new(world.dt),
            ground,
            ball,
            terrain: Vec::new(),
            start: Vector3::zeros(),
            ball_spawn: Vector3::zeros(),
            previous_distance: 0.0,
            respawn_pending: false,
            returned: false,
            respawns: 0,
            config,
        })
    }

    pub fn config(&self) -> &BallRetrievalConfig {
        &self.config
    }

    pub fn ball(&self) -> BodyId {
        self.ball
    }

    pub fn terrain(&self) -> &[BodyId] {
        &self.terrain
    }

    pub fn ball_spawn(&self) -> Vector3<f32> {
        self.ball_spawn
    }

    pub fn respawns(&self) -> u32 {
        self.respawns
    }

    /// Off the ground and not resting on any terrain, so something is
    /// holding it up.
    fn lifted(&self, world: &World, ball: &Vector3<f32>) -> Result<bool, TaskError> {
        if ball.z <= self.config.ball_radius + self.config.lift_margin {
            return Ok(false);
        }
        if world.sim.in_contact(self.ball, self.ground)? {
            return Ok(false);
        }
        for &body in &self.terrain {
            if world.sim.in_contact(self.ball, body)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The robot is touching the ball and the ball is lifted.
    fn carried(&self, world: &World, ball: &Vector3<f32>) -> Result<bool, TaskError> {
        Ok(world.robot_touching(self.ball)? && self.lifted(world, ball)?)
    }

    /// Whether a ball resting at `(x, y)` keeps clear of every terrain
    /// footprint.
    fn spot_is_clear(&self, world: &World, x: f32, y: f32) -> Result<bool, TaskError> {
        let margin = self.config.ball_radius + SPAWN_MARGIN;
        for &body in &self.terrain {
            let pose = world.sim.pose(body)?;
            let offset = Vector3::new(x - pose.position.x, y - pose.position.y, 0.0);
            let local = pose.rotation.inverse_transform_vector(&offset);
            let blocked = match world.sim.spec(body)?.shape {
                Shape::Cylinder { radius, .. } | Shape::Sphere { radius } => {
                    local.xy().norm() < radius + margin
                }
                Shape::Box { half_extents } => {
                    local.x.abs() < half_extents.x + margin
                        && local.y.abs() < half_extents.y + margin
                }
            };
            if blocked {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn clear_terrain(&mut self, world: &mut World) -> Result<(), TaskError> {
        for body in self.terrain.drain(..) {
            world.sim.remove_body(body)?;
        }
        Ok(())
    }

    fn generate_terrain(&mut self, world: &mut World) {
        let config = &self.config;
        let [hx, hy] = config.half_field();
        let rng = &mut world.rng;
        let sim = &mut world.sim;

        let hill = config.hill_half_extents;
        self.terrain.push(sim.create_body(
            &BodySpec::cuboid(hill, [config.hill_position[0], config.hill_position[1], hill[2]])
                .yaw(rng.random_range(0.0..TAU))
                .color([0.5, 0.5, 0.5, 1.0]),
        ));

        let stream = config.stream_half_extents;
        self.terrain.push(sim.create_body(
            &BodySpec::cuboid(
                stream,
                [config.stream_position[0], config.stream_position[1], stream[2]],
            )
            .color([0.0, 0.0, 1.0, 0.5]),
        ));

        for _ in 0..config.num_patches {
            let position = [
                rng.random_range(-hx..=hx),
                rng.random_range(-hy..=hy),
                config.patch_height / 2.0,
            ];
            self.terrain.push(sim.create_body(
                &BodySpec::cylinder(config.patch_radius, config.patch_height, position)
                    .yaw(rng.random_range(0.0..TAU))
                    .color([0.8, 0.8, 0.4, 1.0]),
            ));
        }

        for _ in 0..config.num_obstacles {
            let radius = sample(rng, config.obstacle_radius);
            let height = sample(rng, config.obstacle_height);
            let mut spot = [0.0, 0.0];
            for _ in 0..PLACEMENT_ATTEMPTS {
                spot = [rng.random_range(-hx..=hx), rng.random_range(-hy..=hy)];
                let clearance = (spot[0] - self.start.x).hypot(spot[1] - self.start.y);
                if clearance > config.start_clearance + radius {
                    break;
                }
            }
            let position = Pose::at(spot[0], spot[1], height / 2.0).with_yaw(rng.random_range(0.0..TAU));
            let shape = if rng.random_bool(0.5) {
                Shape::Cylinder { radius, height }
            } else {
                Shape::cuboid(radius, radius, height / 2.0)
            };
            self.terrain.push(sim.create_body(
                &BodySpec::new(shape, position).color([0.4, 0.2, 0.0, 1.0]),
            ));
        }
    }

    fn respawn_ball(&mut self, world: &mut World) -> Result<(), TaskError> {
        let mut spot = self.start;
        let mut clear = false;
        for _ in 0..PLACEMENT_ATTEMPTS {
            let angle = world.rng.random_range(0.0..TAU);
            let distance = sample(&mut world.rng, self.config.ball_distance);
            spot = Vector3::new(
                self.start.x + distance * angle.cos(),
                self.start.y + distance * angle.sin(),
                self.config.ball_radius,
            );
            if self.spot_is_clear(world, spot.x, spot.y)? {
                clear = true;
                break;
            }
        }
        if !clear {
            log::warn!("no open ground for the ball, placing it at {:?} anyway", spot);
        }
        self.ball_spawn = spot;
        world.sim.set_pose(
            self.ball,
            Pose::at(self.ball_spawn.x, self.ball_spawn.y, self.ball_spawn.z),
        )?;
        world.sim.set_velocity(self.ball, Velocity::zero())?;
        Ok(())
    }
}

impl Task for BallRetrieval {
    fn name(&self) -> &'static str {
        "ball_retrieval"
    }

    fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
        self.clear_terrain(world)?;
        self.generate_terrain(world);
        self.respawn_ball(world)?;

        world.place_robot(Pose::at(self.start.x, self.start.y, world.robot.start_height()))?;
        self.previous_distance = world.robot_distance_to(self.ball)?;
        self.respawn_pending = false;
        self.returned = false;
        self.respawns = 0;
        Ok(())
    }

    fn before_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        if self.respawn_pending {
            self.respawn_pending = false;
            self.respawns += 1;
            self.respawn_ball(world)?;
            log::debug!("ball lost, respawned at {:?}", self.ball_spawn);
        }
        self.previous_distance = world.robot_distance_to(self.ball)?;
        Ok(())
    }

    fn task_rewards(&mut self, world: &mut World, _command: &Command) -> Result<Rewards, TaskError> {
        let ball = world.sim.position(self.ball)?;
        let robot = world.robot_position()?;
        let distance = planar_distance(&robot, &ball);

        let explore = self.config.explore_scale * (self.previous_distance - distance) / world.dt;

        let pickup = if self.carried(world, &ball)? {
            self.config.pickup_reward
        } else {
            0.0
        };

        let home = planar_distance(&robot, &self.start) < self.config.success_distance;
        let mut returned = 0.0;
        if !self.returned && home && distance < self.config.success_distance {
            self.returned = true;
            returned = self.config.return_reward;
            log::debug!("ball brought home");
        }

        let lost = planar_distance(&ball, &self.ball_spawn) > self.config.lost_distance
            && distance > self.config.lost_distance;
        let drop = if lost {
            self.respawn_pending = true;
            self.config.drop_penalty
        } else {
            0.0
        };

        Ok(Rewards::new()
            .with("explore_reward", explore)
            .with("pickup_reward", pickup)
            .with("return_reward", returned)
            .with("drop_penalty", drop))
    }

    fn terminated(&self, world: &World, _command: &Command) -> Result<bool, TaskError> {
        Ok(world.robot_flipped()? || self.clock.elapsed() >= self.config.time_limit)
    }

    fn success(&self, world: &World) -> Result<bool, TaskError> {
        let ball = world.sim.position(self.ball)?;
        let robot = world.robot_position()?;
        Ok(planar_distance(&robot, &ball) < self.config.success_distance
            && planar_distance(&robot, &self.start) < self.config.success_distance
            && self.carried(world, &ball)?)
    }

    fn clock(&self) -> &EpisodeClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut EpisodeClock {
        &mut self.clock
    }
}
