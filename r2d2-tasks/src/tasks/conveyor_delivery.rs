//! Conveyor belt item delivery (task_103).
//!
//! Two platforms joined by a belt that carries coloured cubes from a
//! dispenser on the left towards three coloured targets on the right. The
//! robot is paid for bringing each cube onto the target of its own colour.

use r2d2_physics::{BodyId, BodySpec, Pose, Velocity};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{check_range, sample};
use crate::env::World;
use crate::error::{ConfigError, TaskError};
use crate::robot::Command;
use crate::task::{EpisodeClock, Rewards, Task};

pub const COLORS: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConveyorDeliveryConfig {
    pub platform_size: [f32; 3],
    pub platform_spacing: f32,
    pub conveyor_size: [f32; 3],
    pub conveyor_speed: f32,
    pub item_size: f32,
    pub item_mass: f32,
    pub target_size: [f32; 3],
    /// One target per entry of [`COLORS`], same order.
    pub target_positions: [[f32; 3]; 3],
    pub dispenser_position: [f32; 3],
    pub dispense_interval: [f32; 2],
    /// Extra drop height above the left platform when placing the robot.
    pub robot_drop: f32,
    pub time_limit: f32,
    pub deliveries_for_success: u32,
    pub pick_up_reward: f32,
    pub delivery_reward: f32,
    pub wrong_delivery_penalty: f32,
    pub fall_off_penalty: f32,
}

impl Default for ConveyorDeliveryConfig {
    fn default() -> Self {
        Self {
            platform_size: [5.0, 5.0, 0.5],
            platform_spacing: 5.0,
            conveyor_size: [5.0, 1.0, 0.2],
            conveyor_speed: 0.5,
            item_size: 0.5,
            item_mass: 1.0,
            target_size: [1.0, 1.0, 0.01],
            target_positions: [[3.5, 1.5, 0.26], [3.5, 0.0, 0.26], [3.5, -1.5, 0.26]],
            dispenser_position: [-2.0, 0.0, 1.0],
            dispense_interval: [2.0, 5.0],
            robot_drop: 0.1,
            time_limit: 180.0,
            deliveries_for_success: 5,
            pick_up_reward: 1.0,
            delivery_reward: 10.0,
            wrong_delivery_penalty: -1.0,
            fall_off_penalty: -5.0,
        }
    }
}

impl ConveyorDeliveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("dispense_interval", self.dispense_interval)?;
        if self.dispense_interval[0] <= 0.0 {
            return Err(ConfigError::InvalidRange {
                name: "dispense_interval",
                low: self.dispense_interval[0],
                high: self.dispense_interval[1],
            });
        }
        Ok(())
    }

    fn left_platform_x(&self) -> f32 {
        -self.platform_spacing / 2.0
    }

    fn right_platform_x(&self) -> f32 {
        self.platform_spacing / 2.0
    }

    /// Items beyond this x have left the far platform.
    fn despawn_x(&self) -> f32 {
        self.right_platform_x() + self.platform_size[0] / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Item {
    body: BodyId,
    color: usize,
}

pub struct ConveyorDelivery {
    config: ConveyorDeliveryConfig,
    clock: EpisodeClock,
    targets: Vec<BodyId>,
    items: Vec<Item>,
    next_dispense: f32,
    delivered: u32,
    wrong_deliveries: u32,
}

impl ConveyorDelivery {
    pub fn build(config: ConveyorDeliveryConfig, world: &mut World) -> Result<Self, TaskError> {
        config.validate()?;
        let half = config.platform_size.map(|v| v / 2.0);
        let gray = [0.8, 0.8, 0.8, 1.0];
        for x in [config.left_platform_x(), config.right_platform_x()] {
            world
                .sim
                .create_body(&BodySpec::cuboid(half, [x, 0.0, 0.0]).color(gray));
        }

        let belt_half = config.conveyor_size.map(|v| v / 2.0);
        world.sim.create_body(
            &BodySpec::cuboid(belt_half, [0.0, 0.0, half[2] + belt_half[2]])
                .color([0.3, 0.3, 0.3, 1.0]),
        );

        let target_half = config.target_size.map(|v| v / 2.0);
        let targets = config
            .target_positions
            .iter()
            .zip(COLORS)
            .map(|(position, [r, g, b])| {
                world
                    .sim
                    .create_body(&BodySpec::cuboid(target_half, *position).color([r, g, b, 0.5]))
            })
            .collect();

        Ok(Self {
            clock: EpisodeClock::new(world.dt),
            targets,
            items: Vec::new(),
            next_dispense: 0.0,
            delivered: 0,
            wrong_deliveries: 0,
            config,
        })
    }

    pub fn config(&self) -> &ConveyorDeliveryConfig {
        &self.config
    }

    pub fn delivered(&self) -> u32 {
        self.delivered
    }

    pub fn wrong_deliveries(&self) -> u32 {
        self.wrong_deliveries
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Drop a cube of colour `color` (index into [`COLORS`]) at `position`.
    pub fn spawn_item(&mut self, world: &mut World, color: usize, position: [f32; 3]) -> BodyId {
        let [r, g, b] = COLORS[color % COLORS.len()];
        let half = self.config.item_size / 2.0;
        let body = world.sim.create_body(
            &BodySpec::cuboid([half; 3], position)
                .mass(self.config.item_mass)
                .color([r, g, b, 1.0]),
        );
        self.items.push(Item {
            body,
            color: color % COLORS.len(),
        });
        body
    }

    fn clear_items(&mut self, world: &mut World) -> Result<(), TaskError> {
        for item in self.items.drain(..) {
            world.sim.remove_body(item.body)?;
        }
        Ok(())
    }

    fn dispense(&mut self, world: &mut World) {
        let color = world.rng.random_range(0..COLORS.len());
        let body = self.spawn_item(world, color, self.config.dispenser_position);
        let interval = sample(&mut world.rng, self.config.dispense_interval);
        self.next_dispense += interval;
        log::debug!(
            "dispensed {} (color {}), next in {:.2}s",
            body,
            color,
            interval
        );
    }
}

impl Task for ConveyorDelivery {
    fn name(&self) -> &'static str {
        "conveyor_delivery"
    }

    fn reset(&mut self, world: &mut World) -> Result<(), TaskError> {
        self.clear_items(world)?;
        self.delivered = 0;
        self.wrong_deliveries = 0;
        self.next_dispense = sample(&mut world.rng, self.config.dispense_interval);

        let z = self.config.platform_size[2] + world.robot.start_height() + self.config.robot_drop;
        world.place_robot(Pose::at(self.config.left_platform_x(), 0.0, z))?;
        Ok(())
    }

    fn before_step(&mut self, world: &mut World) -> Result<(), TaskError> {
        let despawn_x = self.config.despawn_x();
        let mut gone = Vec::new();
        for item in &self.items {
            let current = world.sim.velocity(item.body)?;
            world.sim.set_velocity(
                item.body,
                Velocity::linear(self.config.conveyor_speed, 0.0, current.linear.z),
            )?;
            if world.sim.position(item.body)?.x > despawn_x {
                gone.push(item.body);
            }
        }
        for body in gone {
            world.sim.remove_body(body)?;
            self.items.retain(|item| item.body != body);
        }

        if self.clock.elapsed() >= self.next_dispense {
            self.dispense(world);
        }
        Ok(())
    }

    fn task_rewards(&mut self, world: &mut World, _command: &Command) -> Result<Rewards, TaskError> {
        let mut pick_up = 0.0;
        for item in &self.items {
            if world.robot_touching(item.body)? {
                pick_up = self.config.pick_up_reward;
                break;
            }
        }

        let mut delivery = 0.0;
        let mut wrong = 0.0;
        let mut consumed = Vec::new();
        for item in &self.items {
            for (index, &target) in self.targets.iter().enumerate() {
                if !world.sim.in_contact(item.body, target)? {
                    continue;
                }
                if index == item.color {
                    delivery += self.config.delivery_reward;
                    self.delivered += 1;
                    log::debug!("delivered {} ({} so far)", item.body, self.delivered);
                } else {
                    wrong += self.config.wrong_delivery_penalty;
                    self.wrong_deliveries += 1;
                    log::debug!("{} landed on the wrong target", item.body);
                }
                consumed.push(item.body);
                break;
            }
        }
        for body in consumed {
            world.sim.remove_body(body)?;
            self.items.retain(|item| item.body != body);
        }

        let fall_off = if world.robot_position()?.z < 0.0 {
            self.config.fall_off_penalty
        } else {
            0.0
        };

        Ok(Rewards::new()
            .with("pick_up_reward", pick_up)
            .with("delivery_reward", delivery)
            .with("wrong_delivery_penalty", wrong)
            .with("fall_off_penalty", fall_off))
    }

    fn terminated(&self, world: &World, _command: &Command) -> Result<bool, TaskError> {
        Ok(world.robot_position()?.z < 0.0 || self.clock.elapsed() >= self.config.time_limit)
    }

    fn success(&self, _world: &World) -> Result<bool, TaskError> {
        Ok(self.delivered >= self.config.deliveries_for_success)
    }

    fn clock(&self) -> &EpisodeClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut EpisodeClock {
        &mut self.clock
    }
}
