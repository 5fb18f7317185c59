use rapier3d::prelude::*;
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use crate::backend::{SimError, Simulation};
use crate::body::{BodyId, BodySpec, Pose, Shape, Velocity};
use crate::config::PhysicsConfig;

// Contact points deeper than this count as touching.
const CONTACT_DISTANCE: f32 = 1e-3;

struct BodyRecord {
    handle: RigidBodyHandle,
    spec: BodySpec,
}

/// Rapier3D world with Z up.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub gravity: Vector<f32>,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    bodies: HashMap<BodyId, BodyRecord>,
    next_id: u64,
}

impl PhysicsWorld {
    pub fn new(config: &PhysicsConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.dt;
        if let Some(iterations) = std::num::NonZeroUsize::new(config.solver_iterations) {
            integration_parameters.num_solver_iterations = iterations;
        }

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            gravity: config.gravity,
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            bodies: HashMap::new(),
            next_id: 0,
        }
    }

    fn handle(&self, id: BodyId) -> Result<RigidBodyHandle, SimError> {
        self.bodies
            .get(&id)
            .map(|record| record.handle)
            .ok_or(SimError::UnknownBody(id))
    }

    fn body(&self, id: BodyId) -> Result<&RigidBody, SimError> {
        let handle = self.handle(id)?;
        self.rigid_body_set
            .get(handle)
            .ok_or(SimError::UnknownBody(id))
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut RigidBody, SimError> {
        let handle = self.handle(id)?;
        self.rigid_body_set
            .get_mut(handle)
            .ok_or(SimError::UnknownBody(id))
    }

    fn collider_for(spec: &BodySpec) -> Collider {
        let mut builder = match spec.shape {
            Shape::Box { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            Shape::Sphere { radius } => ColliderBuilder::ball(radius),
            // Rapier cylinders stand on Y; tip them onto Z.
            Shape::Cylinder { radius, height } => ColliderBuilder::cylinder(height / 2.0, radius)
                .rotation(vector![FRAC_PI_2, 0.0, 0.0]),
        };
        if !spec.is_static() {
            builder = builder.mass(spec.mass);
        }
        if let Some(friction) = spec.friction {
            builder = builder.friction(friction);
        }
        if let Some(restitution) = spec.restitution {
            builder = builder.restitution(restitution);
        }
        builder.build()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

impl Simulation for PhysicsWorld {
    fn create_body(&mut self, spec: &BodySpec) -> BodyId {
        let builder = if spec.is_static() {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let handle = self
            .rigid_body_set
            .insert(builder.position(spec.pose.isometry()).build());
        self.collider_set.insert_with_parent(
            Self::collider_for(spec),
            handle,
            &mut self.rigid_body_set,
        );

        let id = BodyId(self.next_id);
        self.next_id += 1;
        log::debug!(
            "created {} ({:?}, mass {}) at {:?}",
            id,
            spec.shape,
            spec.mass,
            spec.pose.position
        );
        self.bodies.insert(
            id,
            BodyRecord {
                handle,
                spec: spec.clone(),
            },
        );
        id
    }

    fn remove_body(&mut self, id: BodyId) -> Result<(), SimError> {
        let record = self.bodies.remove(&id).ok_or(SimError::UnknownBody(id))?;
        self.rigid_body_set.remove(
            record.handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        log::debug!("removed {}, {} bodies left", id, self.bodies.len());
        Ok(())
    }

    fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn spec(&self, id: BodyId) -> Result<&BodySpec, SimError> {
        self.bodies
            .get(&id)
            .map(|record| &record.spec)
            .ok_or(SimError::UnknownBody(id))
    }

    fn pose(&self, id: BodyId) -> Result<Pose, SimError> {
        Ok(Pose::from(*self.body(id)?.position()))
    }

    fn set_pose(&mut self, id: BodyId, pose: Pose) -> Result<(), SimError> {
        self.body_mut(id)?.set_position(pose.isometry(), true);
        Ok(())
    }

    fn velocity(&self, id: BodyId) -> Result<Velocity, SimError> {
        let body = self.body(id)?;
        Ok(Velocity {
            linear: *body.linvel(),
            angular: *body.angvel(),
        })
    }

    fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<(), SimError> {
        let body = self.body_mut(id)?;
        body.set_linvel(velocity.linear, true);
        body.set_angvel(velocity.angular, true);
        Ok(())
    }

    fn contact_count(&self, a: BodyId, b: Option<BodyId>) -> Result<usize, SimError> {
        let own = self.handle(a)?;
        let target = b.map(|id| self.handle(id)).transpose()?;
        let body = self.body(a)?;

        let mut count = 0;
        for &collider in body.colliders() {
            for pair in self.narrow_phase.contact_pairs_with(collider) {
                if !pair.has_any_active_contact {
                    continue;
                }
                let other = if pair.collider1 == collider {
                    pair.collider2
                } else {
                    pair.collider1
                };
                let Some(other_body) = self.collider_set.get(other).and_then(|c| c.parent()) else {
                    continue;
                };
                if other_body == own || target.is_some_and(|t| t != other_body) {
                    continue;
                }
                let points: usize = pair
                    .manifolds
                    .iter()
                    .map(|m| m.points.iter().filter(|p| p.dist <= CONTACT_DISTANCE).count())
                    .sum();
                count += points.max(1);
            }
        }
        Ok(count)
    }

    fn step(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    fn timestep(&self) -> f32 {
        self.integration_parameters.dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground(world: &mut PhysicsWorld) -> BodyId {
        world.create_body(&BodySpec::cuboid([5.0, 5.0, 0.1], [0.0, 0.0, -0.1]))
    }

    #[test]
    fn test_dropped_ball_comes_to_rest_on_ground() {
        let mut world = PhysicsWorld::default();
        let floor = ground(&mut world);
        let ball = world.create_body(&BodySpec::sphere(0.25, [0.0, 0.0, 1.0]).mass(1.0));

        for _ in 0..480 {
            world.step();
        }

        let z = world.pose(ball).unwrap().position.z;
        assert!(z > 0.2 && z < 0.3, "ball settled at z={z}");
        assert!(world.in_contact(ball, floor).unwrap());
        assert!(world.contact_count(ball, None).unwrap() > 0);
    }

    #[test]
    fn test_static_body_does_not_fall() {
        let mut world = PhysicsWorld::default();
        let block = world.create_body(&BodySpec::cuboid([0.5, 0.5, 0.5], [0.0, 0.0, 3.0]));
        for _ in 0..60 {
            world.step();
        }
        assert_eq!(world.pose(block).unwrap().position.z, 3.0);
    }

    #[test]
    fn test_removed_body_is_unknown() {
        let mut world = PhysicsWorld::default();
        let ball = world.create_body(&BodySpec::sphere(0.25, [0.0, 0.0, 1.0]).mass(1.0));
        assert_eq!(world.body_count(), 1);

        world.remove_body(ball).unwrap();
        assert_eq!(world.body_count(), 0);
        assert!(!world.contains(ball));
        assert_eq!(world.pose(ball), Err(SimError::UnknownBody(ball)));
        assert_eq!(world.remove_body(ball), Err(SimError::UnknownBody(ball)));
    }

    #[test]
    fn test_set_pose_and_velocity_roundtrip() {
        let mut world = PhysicsWorld::default();
        let ball = world.create_body(&BodySpec::sphere(0.25, [0.0, 0.0, 1.0]).mass(1.0));

        world.set_pose(ball, Pose::at(2.0, -1.0, 4.0)).unwrap();
        world
            .set_velocity(ball, Velocity::linear(1.0, 0.0, 0.0))
            .unwrap();

        assert_eq!(world.pose(ball).unwrap().position, vector![2.0, -1.0, 4.0]);
        assert_eq!(world.velocity(ball).unwrap().linear, vector![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_upright_cylinder_rests_on_its_base() {
        let mut world = PhysicsWorld::default();
        ground(&mut world);
        let pillar = world.create_body(&BodySpec::cylinder(0.2, 1.0, [0.0, 0.0, 0.6]).mass(2.0));

        for _ in 0..480 {
            world.step();
        }

        let pose = world.pose(pillar).unwrap();
        assert!((pose.position.z - 0.5).abs() < 0.05, "z={}", pose.position.z);
        assert!(pose.up().z > 0.99);
    }
}
