use nalgebra::Vector3;

/// Physics parameters shared by every backend.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicsConfig {
    pub dt: f32,
    pub solver_iterations: usize,
    pub gravity: Vector3<f32>,
}

impl PhysicsConfig {
    // Bullet's default step, which the task rewards were tuned against.
    pub const DT: f32 = 1.0 / 240.0;
    pub const SOLVER_ITERATIONS: usize = 8;
    pub const GRAVITY_Z: f32 = -9.81;
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            dt: Self::DT,
            solver_iterations: Self::SOLVER_ITERATIONS,
            gravity: Vector3::new(0.0, 0.0, Self::GRAVITY_Z),
        }
    }
}
