//! Kicking a ball through moving gates onto spinning targets (task_122).
//!
//! Gates slide sideways and bounce back once they stray too far from where
//! they started; targets spin in place and flip direction whenever the ball
//! reaches the gate paired with them. Layout and speeds are redrawn on every
//! reset.

use r2d2_physics::{BodyId, BodySpec, Pose, Velocity};
use serde::{Deserialize, Serialize};

use crate::config::{check_range, random_sign, sample};
use crate::env::World;
use crate::error::{ConfigError, TaskError};
use crate::robot::Command;
use crate::task::{EpisodeClock, Rewards, Task};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateKickingConfig {
    pub ground_size: [f32; 3],
    pub friction: f32,
    pub restitution: f32,
    pub ball_radius: f32,
    pub ball_mass: f32,
    pub ball_speed: [f32; 2],
    pub ball_delay: [f32; 2],
    pub num_gates: usize,
    pub gate_width: f32,
    pub gate_height: f32,
    pub gate_thickness: f32,
    pub gate_x: [f32; 2],
    pub gate_y: [f32; 2],
    pub gate_speed: [f32; 2],
    /// Lateral distance from the start at which a gate turns around.
    pub gate_travel: f32,
    pub num_targets: usize,
    pub target_radius: f32,
    pub target_height: f32,
    pub target_x: [f32; 2],
    pub target_y: [f32; 2],
    pub target_spin: [f32; 2],
    /// Robot start distance behind the ball.
    pub robot_offset: f32,
    pub max_steps: u32,
    pub gate_reward: f32,
    /// Paid instead of `gate_reward` when the ball is inside the paired target.
    pub target_reward: f32,
}

impl Default for GateKickingConfig {
    fn default() -> Self {
        Self {
            ground_size: [100.0, 100.0, 0.1],
            friction: 0.8,
            restitution: 0.5,
            ball_radius: 0.5,
            ball_mass: 1.0,
            ball_speed: [1.0, 2.0],
            ball_delay: [1.0, 2.0],
            num_gates: 5,
            gate_width: 1.0,
            gate_height: 3.0,
            gate_thickness: 0.1,
            gate_x: [5.0, 25.0],
            gate_y: [-5.0, 5.0],
            gate_speed: [0.2, 1.0],
            gate_travel: 5.0,
            num_targets: 5,
            target_radius: 2.0,
            target_height: 0.1,
            target_x: [10.0, 30.0],
            target_y: [-10.0, 10.0],
            target_spin: [0.1, 0.5],
            robot_offset: 3.0,
            max_steps: 2000,
            gate_reward: 1.0,
            target_reward: 2.0,
        }
    }
}

impl GateKickingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("ball_speed", self.ball_speed)?;
        check_range("ball_delay", self.ball_delay)?;
        check_range("gate_x", self.gate_x)?;
        check_range("gate_y", self.gate_y)?;
        check_range("gate_speed", self.gate_speed)?;
        check_range("target_x", self.target_x)?;
        check_range("target_y", self.target_y)?;
        check_range("target_spin", self.target_spin)?;
        Ok(())
    }

    fn surface_z(&self) -> f32 {
        self.ground_size[2] / 2.0
    }
}

#[derive(Clone, Debug)]
struct Gate {
    posts: [BodyId; 2],
    start_y: f32,
    x: f32,
    y: f32,
    speed: f32,
}

#[derive(Clone, Debug)]
struct Target {
    body: BodyId,
    position: [f32; 2],
    yaw: f32,
    spin: f32,
}

pub struct GateKicking {
    config: GateKickingConfig,
    clock: EpisodeClock,
    ball: BodyId,
    gates: Vec<Gate>,
    targets: Vec<Target>,
    ball_launch_speed: f32,
    ball_delay: f32,
    launched: bool,
    gates_passed: usize,
    score: f32,
}

impl GateKicking {
    pub fn build(config: GateKickingConfig, world: &mut World) -> Result<Self, TaskError> {
        config.validate()?;
        world.sim.create_body(
            &BodySpec::cuboid(config.ground_size.map(|v| v / 2.0), [0.0, 0.0, 0.0])
                .friction(config.friction)
                .restitution(config.restitution),
        );
        let ball = world.sim.create_body(
            &BodySpec::sphere(config.ball_radius, config.ball_start())
                .mass(config.ball_mass)
                .color([1.0, 0.0, 0.0, 1.0]),
        );

        let post_half = [
            config.gate_thickness / 2.0,
            config.gate_width / 2.0,
            config.gate_height / 2.0,
        ];
        let gates = (0..config.num_gates)
            .map(|_| {
                let post = BodySpec::cuboid(post_half, [0.0; 3]).color([0.0, 0.0, 1.0, 1.0]);
                Gate {
                    posts: [world.sim.create_body(&post), world.sim.create_body(&post)],
                    start_y: 0.0,
                    x: 0.0,
                    y: 0.0,
                    speed: 0.0,
                }
            })
            .collect();

        let targets = (0..config.num_targets)
            .map(|_| Target {
                body: world.sim.create_body(
                    &BodySpec::cylinder(config.target_radius, config.target_height, [0.0; 3])
                        .color([0.0, 1.0, 0.0, 1.0]),
                ),
                position: [0.0; 2],
                yaw: 0.0,
                spin: 0.0,
            })
            .collect();

        Ok(Self {
            clock: EpisodeClock::new(world.dt),
            ball,
            gates,
            targets,
            ball_launch_speed: 0.0,
            ball_delay: 0.0,
            launched: false,
            gates_passed: 0,
            score: 0.0,
            config,
        })
    }

    pub fn config(&self) -> &GateKickingConfig {
        &self.config
    }

    pub fn ball(&self) -> BodyId {
        self.ball
    }

    pub fn gate_posts(&self, index: usize) -> Option<[BodyId; 2]> {
        self.gates.get(index).map(|gate| gate.posts)
    }

    pub fn target_body(&self, index: usize) -> Option<BodyId> {
        self.targets.get(index).map(|target| target.body)
    }

    pub fn target_spin(&self, index: usize) -> Option<f32> {
        self.targets.get(index).map(|target| target.spin)
    }

    pub fn gates_passed(&self) -> usize {
        self.gates_passed
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    fn post_poses(&self, gate: &Gate) -> [Pose; 2] {
        let z = self.config.surface_z() + self.config.gate_height / 2.0;
        let offset = self.config.gate_width / 2.0;
        [
            Pose::at(gate.x, gate.y - offset, z),
            Pose::at(gate.x, gate.y + offset, z),
        ]
    }

    fn target_pose(&self, target: &Target) -> Pose {
        Pose::at(
            target.position[0],
            target.position[1],
            self.config.surface_z() + self.config.target_height / 2.0,
        )
        .with_yaw(target.yaw)
    }

    fn move_gates(&mut self, world: &mut World) -> Result<(), TaskError> {
        let dt = world.dt;
        for i in 0..self.gates.len() {
            let gate = &mut self.gates[i];
            if (gate.y - gate.start_y).abs() > self.config.gate_travel {
                gate.speed = -gate.speed;
            }
            gate.y += gate.speed * dt;
            let gate = self.gates[i].clone();
            for (post, pose) in gate.posts.iter().zip(self.post_poses(&gate)) {
                world.sim.set_pose(*post, pose)?;
            }
        }
        Ok(())
    }

    fn spin_targets(&mut self, world: &mut World) -> Result<(), TaskError> {
        let dt = world.dt;
        for i in 0..self.targets.len() {
            let target = &mut self.targets[i];
            target.yaw += target.spin * dt;
            let pose = self.target_pose(&self.targets[i]);
            world.sim.set_pose(self.targets[i].body, pose)?;
        }
        Ok(())
    }
}

impl GateKickingConfig {
    fn ball_start(&self) -> [f32; 3] {
        [0.0, 0.0, self.surface_z() + self.ball_radius]
    }
}

impl Task for GateKicking {
    fn name(&self) -> &'static str {
        "gate_kicking"
    }

    fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
        let config = &self.config;
        let rng = &mut world.rng;

        self.ball_launch_speed = sample(rng, config.ball_speed);
        self.ball_delay = sample(rng, config.ball_delay);
        for gate in &mut self.gates {
            gate.x = sample(rng, config.gate_x);
            gate.start_y = sample(rng, config.gate_y);
            gate.y = gate.start_y;
            gate.speed = sample(rng, config.gate_speed) * random_sign(rng);
        }
        for target in &mut self.targets {
            target.position = [sample(rng, config.target_x), sample(rng, config.target_y)];
            target.yaw = 0.0;
            target.spin = sample(rng, config.target_spin) * random_sign(rng);
        }

        for gate in &self.gates {
            for (post, pose) in gate.posts.iter().zip(self.post_poses(gate)) {
                world.sim.set_pose(*post, pose)?;
            }
        }
        for target in &self.targets {
            world.sim.set_pose(target.body, self.target_pose(target))?;
        }

        let [x, y, z] = self.config.ball_start();
        world.sim.set_pose(self.ball, Pose::at(x, y, z))?;
        world.sim.set_velocity(self.ball, Velocity::zero())?;
        world.place_robot(Pose::at(
            x - self.config.robot_offset,
            y,
            self.config.surface_z() + world.robot.start_height(),
        ))?;

        self.launched = false;
        self.gates_passed = 0;
        self.score = 0.0;
        Ok(())
    }

    fn after_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        if !self.launched && self.clock.elapsed() > self.ball_delay {
            world
                .sim
                .set_velocity(self.ball, Velocity::linear(self.ball_launch_speed, 0.0, 0.0))?;
            self.launched = true;
            log::debug!("ball launched at {:.2} m/s", self.ball_launch_speed);
        }
        self.move_gates(world)?;
        self.spin_targets(world)
    }

    fn task_rewards(&mut self, world: &mut World, _command: &Command) -> Result<Rewards, TaskError> {
        let mut reward = 0.0;
        if let Some(gate) = self.gates.get(self.gates_passed) {
            let mut hit = false;
            for post in gate.posts {
                hit |= world.sim.in_contact(self.ball, post)?;
            }
            if hit {
                let index = self.gates_passed;
                self.gates_passed += 1;
                reward = self.config.gate_reward;
                if let Some(target) = self.targets.get_mut(index) {
                    let ball = world.sim.pose(self.ball)?;
                    let target_pose = Pose::at(target.position[0], target.position[1], 0.0);
                    if ball.planar_distance(&target_pose) < self.config.target_radius {
                        reward = self.config.target_reward;
                    }
                    target.spin = -target.spin;
                }
                log::debug!(
                    "ball through gate {} of {}, reward {}",
                    self.gates_passed,
                    self.gates.len(),
                    reward
                );
            }
        }
        self.score += reward;
        Ok(Rewards::new().with("gate_reward", reward))
    }

    fn terminated(&self, _world: &World, _command: &Command) -> Result<bool, TaskError> {
        Ok(self.gates_passed >= self.gates.len() || self.clock.steps() >= self.config.max_steps)
    }

    fn success(&self, _world: &World) -> Result<bool, TaskError> {
        Ok(self.gates_passed >= self.gates.len())
    }

    fn clock(&self) -> &EpisodeClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut EpisodeClock {
        &mut self.clock
    }
}
