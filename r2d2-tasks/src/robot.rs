// Command and observation types for the velocity-driven R2D2 base

use nalgebra::{Rotation3, Vector3};
use r2d2_physics::{BodyId, BodySpec, Pose, SimError, Simulation, Velocity};
use serde::{Deserialize, Serialize};

use crate::config::RobotConfig;
use crate::error::TaskError;
use crate::urdf::RobotSpec;

/// Below this the base counts as flipped (`up · z`).
pub const UPRIGHT_MIN: f32 = 0.5;

const JUMP_THRESHOLD: f32 = 0.5;

/// Action for one control step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Forward/backward velocity [-1, 1], body frame
    pub vel_x: f32,
    /// Left/right velocity [-1, 1], body frame
    pub vel_y: f32,
    /// Yaw rotation rate [-1, 1]
    pub yaw_rate: f32,
    /// Jump when above 0.5 and touching something
    pub jump: f32,
}

impl Command {
    pub const SIZE: usize = 4;

    pub fn new(vel_x: f32, vel_y: f32, yaw_rate: f32) -> Self {
        Self {
            vel_x,
            vel_y,
            yaw_rate,
            jump: 0.0,
        }
    }

    /// Build from a flat policy output. A missing fourth entry means no jump.
    pub fn from_slice(values: &[f32]) -> Result<Self, TaskError> {
        if !(3..=Self::SIZE).contains(&values.len()) {
            return Err(TaskError::InvalidAction(format!(
                "expected 3 or 4 values, got {}",
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(TaskError::InvalidAction(format!(
                "non-finite value {bad}"
            )));
        }
        Ok(Self {
            vel_x: values[0],
            vel_y: values[1],
            yaw_rate: values[2],
            jump: values.get(3).copied().unwrap_or(0.0),
        })
    }

    /// Smooth interpolation towards target command. Jumps are not smoothed.
    pub fn lerp(&mut self, target: &Command, alpha: f32) {
        self.vel_x += (target.vel_x - self.vel_x) * alpha;
        self.vel_y += (target.vel_y - self.vel_y) * alpha;
        self.yaw_rate += (target.yaw_rate - self.yaw_rate) * alpha;
        self.jump = target.jump;
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.vel_x, self.vel_y, self.yaw_rate, self.jump]
    }

    /// Clamp to valid range
    pub fn clamp(&mut self) {
        self.vel_x = self.vel_x.clamp(-1.0, 1.0);
        self.vel_y = self.vel_y.clamp(-1.0, 1.0);
        self.yaw_rate = self.yaw_rate.clamp(-1.0, 1.0);
        self.jump = self.jump.clamp(-1.0, 1.0);
    }

    pub fn wants_jump(&self) -> bool {
        self.jump > JUMP_THRESHOLD
    }
}

/// Base state handed back after every reset and step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    /// World position of the base
    pub position: [f32; 3],
    /// Unit quaternion as [i, j, k, w]
    pub orientation: [f32; 4],
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    /// Body +Z in the world frame
    pub up: [f32; 3],
}

impl Observation {
    /// Size of observation vector
    pub const SIZE: usize = 16;

    pub fn new(pose: &Pose, velocity: &Velocity) -> Self {
        let q = pose.rotation.quaternion();
        Self {
            position: pose.position.into(),
            orientation: [q.i, q.j, q.k, q.w],
            linear_velocity: velocity.linear.into(),
            angular_velocity: velocity.angular.into(),
            up: pose.up().into(),
        }
    }

    /// Flat vector for policy input: 3 + 4 + 3 + 3 + 3 = 16 floats
    pub fn to_vec(&self) -> Vec<f32> {
        let mut vec = Vec::with_capacity(Self::SIZE);
        vec.extend_from_slice(&self.position);
        vec.extend_from_slice(&self.orientation);
        vec.extend_from_slice(&self.linear_velocity);
        vec.extend_from_slice(&self.angular_velocity);
        vec.extend_from_slice(&self.up);
        vec
    }
}

/// The controlled robot: one rigid base driven by velocity commands.
#[derive(Clone, Debug)]
pub struct Robot {
    body: BodyId,
    spec: RobotSpec,
    config: RobotConfig,
}

impl Robot {
    /// Create the base body standing at the origin.
    pub fn spawn(sim: &mut dyn Simulation, spec: RobotSpec, config: RobotConfig) -> Self {
        let body = sim.create_body(
            &BodySpec::new(spec.shape, Pose::at(0.0, 0.0, spec.start_height()))
                .mass(spec.mass)
                .color(spec.color),
        );
        log::debug!("spawned robot '{}' as {}", spec.name, body);
        Self { body, spec, config }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn spec(&self) -> &RobotSpec {
        &self.spec
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// Base-centre height above whatever surface it is placed on.
    pub fn start_height(&self) -> f32 {
        self.spec.start_height()
    }

    /// Teleport the base and bring it to rest.
    pub fn place(&self, sim: &mut dyn Simulation, pose: Pose) -> Result<(), SimError> {
        sim.set_pose(self.body, pose)?;
        sim.set_velocity(self.body, Velocity::zero())
    }

    pub fn pose(&self, sim: &dyn Simulation) -> Result<Pose, SimError> {
        sim.pose(self.body)
    }

    pub fn position(&self, sim: &dyn Simulation) -> Result<Vector3<f32>, SimError> {
        sim.position(self.body)
    }

    /// Turn a command into base velocities. Vertical motion is left to
    /// the simulation except for the jump kick.
    pub fn apply(&self, sim: &mut dyn Simulation, command: &Command) -> Result<(), SimError> {
        let pose = sim.pose(self.body)?;
        let current = sim.velocity(self.body)?;

        let heading = Rotation3::from_axis_angle(&Vector3::z_axis(), pose.yaw());
        let planar = heading
            * Vector3::new(command.vel_x, command.vel_y, 0.0)
            * self.config.max_speed;

        let mut linear = Vector3::new(planar.x, planar.y, current.linear.z);
        if command.wants_jump() && sim.contact_count(self.body, None)? > 0 {
            linear.z += self.config.jump_speed;
        }

        let angular = Vector3::new(
            current.angular.x,
            current.angular.y,
            command.yaw_rate * self.config.max_yaw_rate,
        );
        sim.set_velocity(self.body, Velocity { linear, angular })
    }

    pub fn observe(&self, sim: &dyn Simulation) -> Result<Observation, SimError> {
        Ok(Observation::new(
            &sim.pose(self.body)?,
            &sim.velocity(self.body)?,
        ))
    }

    pub fn is_flipped(&self, sim: &dyn Simulation) -> Result<bool, SimError> {
        Ok(sim.pose(self.body)?.up().z < UPRIGHT_MIN)
    }

    pub fn touching(&self, sim: &dyn Simulation, other: BodyId) -> Result<bool, SimError> {
        sim.in_contact(self.body, other)
    }
}
