//! Analytic backend with no collision response.
//!
//! Dynamic bodies move with whatever velocity they were given and nothing
//! else: no gravity, no friction, no solver. Two bodies touch when their
//! world-space bounding boxes overlap. That makes scripted scenarios exact.

use nalgebra::{UnitQuaternion, Vector3};
use std::collections::BTreeMap;

use crate::backend::{SimError, Simulation};
use crate::body::{BodyId, BodySpec, Pose, Velocity};

// Gap within which two bounding boxes still count as touching.
const CONTACT_MARGIN: f32 = 1e-3;

#[derive(Clone, Debug)]
struct KinematicBody {
    spec: BodySpec,
    pose: Pose,
    velocity: Velocity,
}

impl KinematicBody {
    fn bounds(&self) -> (Vector3<f32>, Vector3<f32>) {
        let local = self.spec.shape.local_half_extents();
        let rotation = self.pose.rotation.to_rotation_matrix();
        let half = rotation.matrix().abs() * local;
        (self.pose.position - half, self.pose.position + half)
    }
}

#[derive(Clone, Debug)]
pub struct KinematicWorld {
    dt: f32,
    bodies: BTreeMap<BodyId, KinematicBody>,
    next_id: u64,
}

impl KinematicWorld {
    pub fn new(dt: f32) -> Self {
        Self {
            dt,
            bodies: BTreeMap::new(),
            next_id: 0,
        }
    }

    fn get(&self, id: BodyId) -> Result<&KinematicBody, SimError> {
        self.bodies.get(&id).ok_or(SimError::UnknownBody(id))
    }

    fn get_mut(&mut self, id: BodyId) -> Result<&mut KinematicBody, SimError> {
        self.bodies.get_mut(&id).ok_or(SimError::UnknownBody(id))
    }

    fn overlaps(a: &KinematicBody, b: &KinematicBody) -> bool {
        let (a_min, a_max) = a.bounds();
        let (b_min, b_max) = b.bounds();
        (0..3).all(|i| a_min[i] <= b_max[i] + CONTACT_MARGIN && b_min[i] <= a_max[i] + CONTACT_MARGIN)
    }
}

impl Simulation for KinematicWorld {
    fn create_body(&mut self, spec: &BodySpec) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            id,
            KinematicBody {
                spec: spec.clone(),
                pose: spec.pose,
                velocity: Velocity::zero(),
            },
        );
        id
    }

    fn remove_body(&mut self, id: BodyId) -> Result<(), SimError> {
        self.bodies
            .remove(&id)
            .map(|_| ())
            .ok_or(SimError::UnknownBody(id))
    }

    fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn spec(&self, id: BodyId) -> Result<&BodySpec, SimError> {
        Ok(&self.get(id)?.spec)
    }

    fn pose(&self, id: BodyId) -> Result<Pose, SimError> {
        Ok(self.get(id)?.pose)
    }

    fn set_pose(&mut self, id: BodyId, pose: Pose) -> Result<(), SimError> {
        self.get_mut(id)?.pose = pose;
        Ok(())
    }

    fn velocity(&self, id: BodyId) -> Result<Velocity, SimError> {
        Ok(self.get(id)?.velocity)
    }

    fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<(), SimError> {
        let body = self.get_mut(id)?;
        // Static bodies ignore velocity, as in the Rapier world.
        if !body.spec.is_static() {
            body.velocity = velocity;
        }
        Ok(())
    }

    fn contact_count(&self, a: BodyId, b: Option<BodyId>) -> Result<usize, SimError> {
        let body = self.get(a)?;
        match b {
            Some(other) => Ok(usize::from(Self::overlaps(body, self.get(other)?))),
            None => Ok(self
                .bodies
                .iter()
                .filter(|(id, other)| **id != a && Self::overlaps(body, other))
                .count()),
        }
    }

    fn step(&mut self) {
        let dt = self.dt;
        for body in self.bodies.values_mut().filter(|b| !b.spec.is_static()) {
            body.pose.position += body.velocity.linear * dt;
            body.pose.rotation =
                UnitQuaternion::from_scaled_axis(body.velocity.angular * dt) * body.pose.rotation;
        }
    }

    fn timestep(&self) -> f32 {
        self.dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_bodies_integrate_velocity() {
        let mut world = KinematicWorld::new(0.5);
        let cube = world.create_body(&BodySpec::cuboid([0.25; 3], [0.0, 0.0, 1.0]).mass(1.0));
        world
            .set_velocity(cube, Velocity::linear(1.0, 0.0, 0.0))
            .unwrap();

        world.step();
        world.step();

        assert_eq!(world.pose(cube).unwrap().position, Vector3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_static_bodies_ignore_velocity() {
        let mut world = KinematicWorld::new(0.5);
        let wall = world.create_body(&BodySpec::cuboid([0.25; 3], [0.0, 0.0, 1.0]));
        world
            .set_velocity(wall, Velocity::linear(1.0, 0.0, 0.0))
            .unwrap();
        world.step();
        assert_eq!(world.pose(wall).unwrap().position, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_overlapping_bounds_are_contacts() {
        let mut world = KinematicWorld::new(0.01);
        let floor = world.create_body(&BodySpec::cuboid([2.0, 2.0, 0.1], [0.0, 0.0, 0.0]));
        let resting = world.create_body(&BodySpec::cuboid([0.25; 3], [0.0, 0.0, 0.35]).mass(1.0));
        let floating = world.create_body(&BodySpec::sphere(0.25, [0.0, 0.0, 2.0]).mass(1.0));

        assert!(world.in_contact(resting, floor).unwrap());
        assert!(!world.in_contact(floating, floor).unwrap());
        assert_eq!(world.contact_count(floor, None).unwrap(), 1);
    }

    #[test]
    fn test_rotated_box_bounds_grow() {
        let mut world = KinematicWorld::new(0.01);
        let plank = world.create_body(
            &BodySpec::cuboid([1.0, 0.1, 0.1], [0.0, 0.0, 0.0]).yaw(std::f32::consts::FRAC_PI_2),
        );
        let marker = world.create_body(&BodySpec::sphere(0.05, [0.0, 0.9, 0.0]));
        assert!(world.in_contact(plank, marker).unwrap());
    }
}
