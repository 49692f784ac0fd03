use std::f32::consts::FRAC_PI_2;

use engine::{clamp, InputAction, InputSnapshot, Vec3};

use super::city::Building;
use super::movement::{resolve_player_motion, WorldBounds};
use crate::app::config::PlayerConfig;

/// First-person controller. Yaw turns around +Y with zero facing -Z.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Player {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    speed: f32,
    eye_height: f32,
    radius: f32,
    look_sensitivity: f32,
}

impl Player {
    pub(crate) fn new(config: &PlayerConfig) -> Self {
        Self {
            position: Vec3::new(config.spawn_x, config.eye_height, config.spawn_z),
            yaw: 0.0,
            pitch: 0.0,
            speed: config.speed,
            eye_height: config.eye_height,
            radius: config.radius,
            look_sensitivity: config.look_sensitivity,
        }
    }

    pub(crate) fn position(&self) -> Vec3 {
        self.position
    }

    pub(crate) fn yaw(&self) -> f32 {
        self.yaw
    }

    pub(crate) fn pitch(&self) -> f32 {
        self.pitch
    }

    #[cfg(test)]
    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = Vec3::new(position.x, self.eye_height, position.z);
    }

    /// Applied immediately, no smoothing. Pitch never passes straight up or down.
    pub(crate) fn apply_look(&mut self, dx: f32, dy: f32) {
        if !(dx.is_finite() && dy.is_finite()) {
            return;
        }
        self.yaw -= dx * self.look_sensitivity;
        self.pitch = clamp(
            self.pitch - dy * self.look_sensitivity,
            -FRAC_PI_2,
            FRAC_PI_2,
        );
    }

    pub(crate) fn forward(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, -self.yaw.cos())
    }

    pub(crate) fn right(&self) -> Vec3 {
        let forward = self.forward();
        Vec3::new(-forward.z, 0.0, forward.x)
    }

    /// Combined WASD displacement for one tick, normalized so diagonals are
    /// not faster than straight lines.
    pub(crate) fn movement_displacement(&self, input: &InputSnapshot, dt: f32) -> Vec3 {
        let forward = self.forward();
        let right = self.right();
        let mut wish = Vec3::ZERO;
        if input.is_down(InputAction::MoveForward) {
            wish += forward;
        }
        if input.is_down(InputAction::MoveBack) {
            wish += -forward;
        }
        if input.is_down(InputAction::StrafeRight) {
            wish += right;
        }
        if input.is_down(InputAction::StrafeLeft) {
            wish += -right;
        }
        wish.normalize_or_zero() * (self.speed * dt)
    }

    pub(crate) fn update(
        &mut self,
        dt: f32,
        input: &InputSnapshot,
        buildings: &[Building],
        bounds: WorldBounds,
    ) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let (dx, dy) = input.look_delta();
        self.apply_look(dx, dy);

        let displacement = self.movement_displacement(input, dt);
        self.position = resolve_player_motion(
            self.position,
            displacement,
            buildings,
            bounds,
            self.radius,
            self.eye_height,
        );
    }

    /// Collision and bounds still apply while the player stands still, so a
    /// building spawned on top of them pushes them clear.
    pub(crate) fn settle(&mut self, buildings: &[Building], bounds: WorldBounds) {
        self.position = resolve_player_motion(
            self.position,
            Vec3::ZERO,
            buildings,
            bounds,
            self.radius,
            self.eye_height,
        );
    }
}
