use std::fmt;
use std::str::FromStr;

use r2d2_physics::Simulation;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::EnvConfig;
use crate::env::{TaskEnv, World};
use crate::error::{ConfigError, TaskError};
use crate::task::Task;
use crate::tasks::{
    BallRetrieval, ConveyorDelivery, GapJumping, GateKicking, ObstacleCourse, Soccer,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ConveyorDelivery,
    GapJumping,
    GateKicking,
    Soccer,
    ObstacleCourse,
    BallRetrieval,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::ConveyorDelivery,
        TaskKind::GapJumping,
        TaskKind::GateKicking,
        TaskKind::Soccer,
        TaskKind::ObstacleCourse,
        TaskKind::BallRetrieval,
    ];

    /// Numbered id, e.g. `task_103`.
    pub fn id(self) -> &'static str {
        match self {
            TaskKind::ConveyorDelivery => "task_103",
            TaskKind::GapJumping => "task_197",
            TaskKind::GateKicking => "task_122",
            TaskKind::Soccer => "task_60",
            TaskKind::ObstacleCourse => "task_84",
            TaskKind::BallRetrieval => "task_90",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::ConveyorDelivery => "conveyor_delivery",
            TaskKind::GapJumping => "gap_jumping",
            TaskKind::GateKicking => "gate_kicking",
            TaskKind::Soccer => "soccer",
            TaskKind::ObstacleCourse => "obstacle_course",
            TaskKind::BallRetrieval => "ball_retrieval",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s || kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownTask(s.to_string()))
    }
}

/// Build an environment for `kind`. `overrides` is merged over the task's
/// default config; fields it leaves out keep their defaults.
pub fn make_env(
    kind: TaskKind,
    sim: Box<dyn Simulation>,
    config: EnvConfig,
    overrides: Option<Value>,
) -> Result<TaskEnv<Box<dyn Task>>, TaskError> {
    match kind {
        TaskKind::ConveyorDelivery => boxed(sim, config, overrides, ConveyorDelivery::build),
        TaskKind::GapJumping => boxed(sim, config, overrides, GapJumping::build),
        TaskKind::GateKicking => boxed(sim, config, overrides, GateKicking::build),
        TaskKind::Soccer => boxed(sim, config, overrides, Soccer::build),
        TaskKind::ObstacleCourse => boxed(sim, config, overrides, ObstacleCourse::build),
        TaskKind::BallRetrieval => boxed(sim, config, overrides, BallRetrieval::build),
    }
}

fn boxed<C, T>(
    sim: Box<dyn Simulation>,
    config: EnvConfig,
    overrides: Option<Value>,
    build: fn(C, &mut World) -> Result<T, TaskError>,
) -> Result<TaskEnv<Box<dyn Task>>, TaskError>
where
    C: DeserializeOwned + Default,
    T: Task + 'static,
{
    let task_config = match overrides {
        Some(value) => serde_json::from_value(value).map_err(ConfigError::from)?,
        None => C::default(),
    };
    TaskEnv::new(sim, config, |world| {
        build(task_config, world).map(|task| Box::new(task) as Box<dyn Task>)
    })
}
