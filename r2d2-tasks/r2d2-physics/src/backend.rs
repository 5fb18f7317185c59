use crate::body::{BodyId, BodySpec, Pose, Velocity};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The body was removed or never existed in this backend.
    #[error("unknown {0}")]
    UnknownBody(BodyId),
}

/// Engine-facing surface every task is written against.
///
/// One `step` advances simulated time by `timestep()` seconds. Backend state
/// is authoritative; callers must re-query after each step.
pub trait Simulation {
    fn create_body(&mut self, spec: &BodySpec) -> BodyId;

    fn remove_body(&mut self, id: BodyId) -> Result<(), SimError>;

    fn contains(&self, id: BodyId) -> bool;

    fn body_count(&self) -> usize;

    fn spec(&self, id: BodyId) -> Result<&BodySpec, SimError>;

    fn pose(&self, id: BodyId) -> Result<Pose, SimError>;

    fn set_pose(&mut self, id: BodyId, pose: Pose) -> Result<(), SimError>;

    fn velocity(&self, id: BodyId) -> Result<Velocity, SimError>;

    fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<(), SimError>;

    /// Contact points between `a` and `b`, or between `a` and any other body
    /// when `b` is `None`.
    fn contact_count(&self, a: BodyId, b: Option<BodyId>) -> Result<usize, SimError>;

    fn step(&mut self);

    fn timestep(&self) -> f32;

    fn in_contact(&self, a: BodyId, b: BodyId) -> Result<bool, SimError> {
        Ok(self.contact_count(a, Some(b))? > 0)
    }

    fn position(&self, id: BodyId) -> Result<nalgebra::Vector3<f32>, SimError> {
        Ok(self.pose(id)?.position)
    }
}
