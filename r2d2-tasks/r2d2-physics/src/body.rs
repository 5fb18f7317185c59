use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use std::fmt;

/// Handle to one body inside one backend. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub(crate) u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Collision/visual primitive. Cylinders stand along world +Z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Box { half_extents: Vector3<f32> },
    Sphere { radius: f32 },
    Cylinder { radius: f32, height: f32 },
}

impl Shape {
    pub fn cuboid(hx: f32, hy: f32, hz: f32) -> Self {
        Shape::Box {
            half_extents: Vector3::new(hx, hy, hz),
        }
    }

    /// Half extents of the shape in its own frame.
    pub fn local_half_extents(&self) -> Vector3<f32> {
        match *self {
            Shape::Box { half_extents } => half_extents,
            Shape::Sphere { radius } => Vector3::repeat(radius),
            Shape::Cylinder { radius, height } => Vector3::new(radius, radius, height / 2.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Pose {
    pub fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self::new(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, yaw);
        self
    }

    pub fn yaw(&self) -> f32 {
        self.rotation.euler_angles().2
    }

    /// Body +Z expressed in the world frame.
    pub fn up(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    pub fn planar_distance(&self, other: &Pose) -> f32 {
        planar_distance(&self.position, &other.position)
    }

    pub fn isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(0.0, 0.0, 0.0)
    }
}

impl From<Isometry3<f32>> for Pose {
    fn from(iso: Isometry3<f32>) -> Self {
        Self::new(iso.translation.vector, iso.rotation)
    }
}

/// Distance between two points ignoring height.
pub fn planar_distance(a: &Vector3<f32>, b: &Vector3<f32>) -> f32 {
    (a.xy() - b.xy()).norm()
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub linear: Vector3<f32>,
    pub angular: Vector3<f32>,
}

impl Velocity {
    pub fn linear(x: f32, y: f32, z: f32) -> Self {
        Self {
            linear: Vector3::new(x, y, z),
            angular: Vector3::zeros(),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Everything needed to create a body. Mass 0 means static.
#[derive(Clone, Debug, PartialEq)]
pub struct BodySpec {
    pub shape: Shape,
    pub mass: f32,
    pub pose: Pose,
    pub color: [f32; 4],
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
}

impl BodySpec {
    pub fn new(shape: Shape, pose: Pose) -> Self {
        Self {
            shape,
            mass: 0.0,
            pose,
            color: [0.5, 0.5, 0.5, 1.0],
            friction: None,
            restitution: None,
        }
    }

    pub fn cuboid(half_extents: [f32; 3], position: [f32; 3]) -> Self {
        Self::new(
            Shape::cuboid(half_extents[0], half_extents[1], half_extents[2]),
            Pose::at(position[0], position[1], position[2]),
        )
    }

    pub fn sphere(radius: f32, position: [f32; 3]) -> Self {
        Self::new(
            Shape::Sphere { radius },
            Pose::at(position[0], position[1], position[2]),
        )
    }

    pub fn cylinder(radius: f32, height: f32, position: [f32; 3]) -> Self {
        Self::new(
            Shape::Cylinder { radius, height },
            Pose::at(position[0], position[1], position[2]),
        )
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    pub fn yaw(mut self, yaw: f32) -> Self {
        self.pose = self.pose.with_yaw(yaw);
        self
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn restitution(mut self, restitution: f32) -> Self {
        self.restitution = Some(restitution);
        self
    }

    pub fn is_static(&self) -> bool {
        self.mass <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaw_and_up() {
        let pose = Pose::at(1.0, 2.0, 3.0).with_yaw(std::f32::consts::FRAC_PI_2);
        assert!((pose.yaw() - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert!((pose.up() - Vector3::z()).norm() < 1e-5);
    }

    #[test]
    fn test_planar_distance_ignores_height() {
        let a = Pose::at(0.0, 0.0, 10.0);
        let b = Pose::at(3.0, 4.0, -2.0);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_cylinder_extents_stand_on_z() {
        let shape = Shape::Cylinder {
            radius: 0.5,
            height: 2.0,
        };
        assert_eq!(shape.local_half_extents(), Vector3::new(0.5, 0.5, 1.0));
    }
}
