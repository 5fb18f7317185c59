//! R2D2 long-run task suite.
//!
//! Each task lays out a scene on a [`r2d2_physics::Simulation`], shapes a
//! per-step reward and decides when an episode ends. [`env::TaskEnv`] drives
//! the reset/step loop; [`registry`] builds any task by name.

pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod registry;
pub mod robot;
pub mod task;
pub mod tasks;
pub mod urdf;

pub use config::{EnvConfig, RobotConfig, RunConfig};
pub use env::{StepInfo, TaskEnv, Transition, World};
pub use error::{ConfigError, TaskError, UrdfError};
pub use registry::{make_env, TaskKind};
pub use robot::{Command, Observation, Robot};
pub use task::{EpisodeClock, Rewards, Task};
