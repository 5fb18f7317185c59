//! The per-scenario episode contract.
//!
//! A task builds its static scene once (its constructor), then for every
//! episode: `reset` → repeated { `before_step`, physics, `after_step`,
//! `task_rewards`, `terminated` } → `success`. The [`TaskEnv`](crate::env::TaskEnv)
//! drives the calls and owns the ordering.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::env::World;
use crate::error::TaskError;
use crate::robot::Command;

/// Simulated time of the current episode, counted in control steps.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EpisodeClock {
    steps: u32,
    dt: f32,
}

impl EpisodeClock {
    pub fn new(dt: f32) -> Self {
        Self { steps: 0, dt }
    }

    pub fn restart(&mut self, dt: f32) {
        self.steps = 0;
        self.dt = dt;
    }

    pub fn tick(&mut self) {
        self.steps += 1;
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Seconds since reset. Derived from the step count so it never drifts.
    pub fn elapsed(&self) -> f32 {
        (f64::from(self.steps) * f64::from(self.dt)) as f32
    }
}

/// Named reward terms of one step, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rewards {
    terms: Vec<(&'static str, f32)>,
}

impl Rewards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: f32) -> Self {
        self.push(name, value);
        self
    }

    /// Adds to an existing term of the same name.
    pub fn push(&mut self, name: &'static str, value: f32) {
        match self.terms.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v += value,
            None => self.terms.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.terms.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn total(&self) -> f32 {
        self.terms.iter().map(|(_, v)| v).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.terms.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Serialize for Rewards {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.terms.len()))?;
        for (name, value) in &self.terms {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub trait Task {
    fn name(&self) -> &'static str;

    /// Start a new episode: redraw randomized parameters, put every dynamic
    /// body back (removing last episode's spawned bodies), zero counters
    /// and place the robot. The clock has already been restarted.
    fn reset(&mut self, world: &mut World) -> Result<(), TaskError>;

    /// Runs before the command is applied and physics advances.
    fn before_step(&mut self, _world: &mut World) -> Result<(), TaskError> {
        Ok(())
    }

    /// Runs after physics, with the clock already advanced.
    fn after_step(&mut self, _world: &mut World) -> Result<(), TaskError> {
        Ok(())
    }

    /// Reward terms for the step just taken. May consume bodies and bump
    /// counters, so it runs exactly once per step.
    fn task_rewards(&mut self, world: &mut World, command: &Command)
        -> Result<Rewards, TaskError>;

    fn terminated(&self, world: &World, command: &Command) -> Result<bool, TaskError>;

    fn success(&self, world: &World) -> Result<bool, TaskError>;

    fn clock(&self) -> &EpisodeClock;

    fn clock_mut(&mut self) -> &mut EpisodeClock;
}

impl Task for Box<dyn Task> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
        (**self).reset(world)
    }

    fn before_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        (**self).before_step(world)
    }

    fn after_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        (**self).after_step(world)
    }

    fn task_rewards(
        &mut self,
        world: &mut World,
        command: &Command,
    ) -> Result<Rewards, TaskError> {
        (**self).task_rewards(world, command)
    }

    fn terminated(&self, world: &World, command: &Command) -> Result<bool, TaskError> {
        (**self).terminated(world, command)
    }

    fn success(&self, world: &World) -> Result<bool, TaskError> {
        (**self).success(world)
    }

    fn clock(&self) -> &EpisodeClock {
        (**self).clock()
    }

    fn clock_mut(&mut self) -> &mut EpisodeClock {
        (**self).clock_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_counts_whole_steps() {
        let mut clock = EpisodeClock::new(1.0 / 60.0);
        for _ in 0..10_800 {
            clock.tick();
        }
        assert_eq!(clock.steps(), 10_800);
        assert!(clock.elapsed() >= 180.0 - 1e-4);

        clock.restart(0.5);
        assert_eq!(clock.elapsed(), 0.0);
    }

    #[test]
    fn test_rewards_total_and_merge() {
        let mut rewards = Rewards::new().with("delivery", 10.0).with("penalty", -1.0);
        rewards.push("delivery", 10.0);
        assert_eq!(rewards.get("delivery"), Some(20.0));
        assert_eq!(rewards.len(), 2);
        assert_eq!(rewards.total(), 19.0);
    }

    #[test]
    fn test_rewards_serialize_as_map() {
        let rewards = Rewards::new().with("a", 1.0).with("b", 0.5);
        let json = serde_json::to_string(&rewards).unwrap();
        assert_eq!(json, r#"{"a":1.0,"b":0.5}"#);
    }
}
