use r2d2_physics::PhysicsConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Settings shared by every task environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub physics_dt: f32,
    /// Physics steps per control step.
    pub substeps: u32,
    pub solver_iterations: usize,
    pub seed: u64,
    /// Episodes longer than this are truncated. `None` leaves it to the task.
    pub max_episode_steps: Option<u32>,
    /// Blend factor towards each new command, 1.0 applies it as-is.
    pub command_smoothing: f32,
    pub robot: RobotConfig,
}

impl EnvConfig {
    pub const SUBSTEPS: u32 = 4;

    /// Simulated seconds per `step` call.
    pub fn control_dt(&self) -> f32 {
        self.physics_dt * self.substeps.max(1) as f32
    }

    pub fn physics(&self) -> PhysicsConfig {
        PhysicsConfig {
            dt: self.physics_dt,
            solver_iterations: self.solver_iterations,
            ..PhysicsConfig::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(RunConfig::from_path(path)?.env)
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            physics_dt: PhysicsConfig::DT,
            substeps: Self::SUBSTEPS,
            solver_iterations: PhysicsConfig::SOLVER_ITERATIONS,
            seed: 0,
            max_episode_steps: None,
            command_smoothing: 1.0,
            robot: RobotConfig::default(),
        }
    }
}

/// Velocity-command base limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub max_speed: f32,
    pub max_yaw_rate: f32,
    pub jump_speed: f32,
    /// Alternative robot description. The bundled R2D2 URDF is used otherwise.
    pub urdf_path: Option<String>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            max_speed: 1.5,
            max_yaw_rate: 2.0,
            jump_speed: 4.0,
            urdf_path: None,
        }
    }
}

/// On-disk layout read by the rollout CLI: shared env settings plus
/// free-form overrides for the selected task's own config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub env: EnvConfig,
    pub task: Option<serde_json::Value>,
}

impl RunConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub fn check_range(name: &'static str, range: [f32; 2]) -> Result<(), ConfigError> {
    if range[0].is_finite() && range[1].is_finite() && range[0] <= range[1] {
        Ok(())
    } else {
        Err(ConfigError::InvalidRange {
            name,
            low: range[0],
            high: range[1],
        })
    }
}

/// Uniform draw from a validated `[low, high]` range.
pub fn sample(rng: &mut impl Rng, range: [f32; 2]) -> f32 {
    rng.random_range(range[0]..=range[1])
}

pub fn random_sign(rng: &mut impl Rng) -> f32 {
    if rng.random_bool(0.5) {
        1.0
    } else {
        -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = EnvConfig::from_json_str(r#"{ "seed": 7, "robot": { "max_speed": 3.0 } }"#)
            .unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.robot.max_speed, 3.0);
        assert_eq!(cfg.robot.jump_speed, RobotConfig::default().jump_speed);
        assert_eq!(cfg.substeps, EnvConfig::SUBSTEPS);
    }

    #[test]
    fn test_control_dt_spans_substeps() {
        let cfg = EnvConfig::default();
        assert!((cfg.control_dt() - 4.0 / 240.0).abs() < 1e-7);
    }

    #[test]
    fn test_degenerate_range_samples_its_value() {
        let mut rng = StdRng::seed_from_u64(1);
        check_range("interval", [2.0, 2.0]).unwrap();
        assert_eq!(sample(&mut rng, [2.0, 2.0]), 2.0);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(check_range("interval", [5.0, 2.0]).is_err());
        assert!(check_range("interval", [f32::NAN, 2.0]).is_err());
    }
}
