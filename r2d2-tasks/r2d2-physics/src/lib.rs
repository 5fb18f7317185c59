//! Simulation backend for the R2D2 task suite.
//!
//! Tasks talk to a [`Simulation`] and never to a concrete engine. Two backends
//! ship here: [`PhysicsWorld`] runs Rapier3D, [`KinematicWorld`] is an analytic
//! stand-in for scripted scenarios.

pub mod backend;
pub mod body;
pub mod config;
pub mod kinematic;
pub mod world;

pub use backend::{SimError, Simulation};
pub use body::{planar_distance, BodyId, BodySpec, Pose, Shape, Velocity};
pub use config::PhysicsConfig;
pub use kinematic::KinematicWorld;
pub use world::PhysicsWorld;

pub use nalgebra as na;
