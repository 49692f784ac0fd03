use std::fmt;

use engine::Vec3;
use rand::Rng;
use tracing::trace;

use super::city::Building;
use super::movement::{resolve_npc_step, WorldBounds};
use super::util::{pick_color, random_horizontal_direction, sample_range, NPC_COLORS};
use crate::app::config::NpcConfig;

pub(crate) const NPC_BODY_HEIGHT: f32 = 1.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct NpcId(pub(crate) usize);

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "npc_{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Npc {
    id: NpcId,
    position: Vec3,
    direction: Vec3,
    speed: f32,
    time_since_turn: f32,
    turn_interval: f32,
    ground_height: f32,
    color: u32,
}

impl Npc {
    pub(crate) fn spawn<R: Rng + ?Sized>(
        id: NpcId,
        position: Vec3,
        config: &NpcConfig,
        rng: &mut R,
    ) -> Self {
        let speed = sample_range(rng, config.speed_min, config.speed_max);
        let direction = random_horizontal_direction(rng);
        let turn_interval = sample_range(rng, config.turn_interval_min, config.turn_interval_max);
        let color = pick_color(rng, &NPC_COLORS);
        Self::with_state(id, position, direction, speed, turn_interval, config.ground_height)
            .with_color(color)
    }

    pub(crate) fn with_state(
        id: NpcId,
        position: Vec3,
        direction: Vec3,
        speed: f32,
        turn_interval: f32,
        ground_height: f32,
    ) -> Self {
        Self {
            id,
            position: Vec3::new(position.x, ground_height, position.z),
            direction: direction.horizontal().normalize_or_zero(),
            speed,
            time_since_turn: 0.0,
            turn_interval,
            ground_height,
            color: 0xffffff,
        }
    }

    fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    pub(crate) fn id(&self) -> NpcId {
        self.id
    }

    pub(crate) fn position(&self) -> Vec3 {
        self.position
    }

    #[cfg(test)]
    pub(crate) fn direction(&self) -> Vec3 {
        self.direction
    }

    pub(crate) fn speed(&self) -> f32 {
        self.speed
    }

    #[cfg(test)]
    pub(crate) fn turn_interval(&self) -> f32 {
        self.turn_interval
    }

    pub(crate) fn color(&self) -> u32 {
        self.color
    }

    /// Wander for one tick: maybe pick a fresh heading, then step with the
    /// shared NPC collision policy. Non-positive or non-finite `dt` is a no-op.
    pub(crate) fn update<R: Rng + ?Sized>(
        &mut self,
        dt: f32,
        buildings: &[Building],
        bounds: WorldBounds,
        rng: &mut R,
    ) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        self.time_since_turn += dt;
        if self.time_since_turn > self.turn_interval {
            self.direction = random_horizontal_direction(rng);
            self.time_since_turn = 0.0;
        }

        let step = resolve_npc_step(
            self.position,
            self.direction,
            self.speed * dt,
            buildings,
            bounds,
        );
        if step.bounced {
            trace!(npc = %self.id, "npc_bounced");
        }
        self.position = Vec3::new(step.position.x, self.ground_height, step.position.z);
        self.direction = step.direction;
    }
}
