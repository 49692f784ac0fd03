//! Shared movement and collision policy for the player and NPCs.
//!
//! Everything here is a pure function of its inputs. Resolution is local:
//! residual overlap after a tick is tolerated and worked out over the
//! following ticks.

use engine::{clamp, Vec3};

use super::city::Building;

/// Square world region `[-half_extent, half_extent]` on x and z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WorldBounds {
    half_extent: f32,
}

impl WorldBounds {
    pub(crate) fn new(half_extent: f32) -> Self {
        Self {
            half_extent: half_extent.abs(),
        }
    }

    pub(crate) fn contains_horizontal(&self, position: Vec3) -> bool {
        position.x.abs() <= self.half_extent && position.z.abs() <= self.half_extent
    }

    pub(crate) fn clamp_horizontal(&self, position: Vec3) -> Vec3 {
        Vec3 {
            x: clamp(position.x, -self.half_extent, self.half_extent),
            y: position.y,
            z: clamp(position.z, -self.half_extent, self.half_extent),
        }
    }
}

pub(crate) fn is_inside_any_building(position: Vec3, buildings: &[Building]) -> bool {
    buildings
        .iter()
        .any(|building| building.volume.contains_point(position))
}

pub(crate) fn is_position_valid(position: Vec3, buildings: &[Building], bounds: WorldBounds) -> bool {
    bounds.contains_horizontal(position) && !is_inside_any_building(position, buildings)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NpcStep {
    pub(crate) position: Vec3,
    pub(crate) direction: Vec3,
    pub(crate) bounced: bool,
}

/// NPC branch: move along `direction`; if the target is off-bounds or inside
/// a building, reverse and take one step of the same length the other way.
/// The corrected position is not re-validated.
pub(crate) fn resolve_npc_step(
    position: Vec3,
    direction: Vec3,
    step_length: f32,
    buildings: &[Building],
    bounds: WorldBounds,
) -> NpcStep {
    let intended = position + direction * step_length;
    if !intended.is_finite() {
        return NpcStep {
            position,
            direction,
            bounced: false,
        };
    }
    let (position, direction, bounced) = if is_position_valid(intended, buildings, bounds) {
        (intended, direction, false)
    } else {
        let reversed = -direction;
        (position + reversed * step_length, reversed, true)
    };

    NpcStep {
        position: bounds.clamp_horizontal(position),
        direction,
        bounced,
    }
}

/// Player branch: for each building in list order, push the point directly
/// away from the box's closest point by the penetration depth. A point
/// already inside a box has no defined push direction and is left in place.
pub(crate) fn push_out_of_buildings(position: Vec3, buildings: &[Building], radius: f32) -> Vec3 {
    let mut resolved = position;
    for building in buildings {
        let closest = building.volume.clamp_point(resolved);
        let distance = resolved.distance(closest);
        if distance < radius {
            let overlap = radius - distance;
            let away = (resolved - closest).normalize_or_zero();
            resolved += away * overlap;
        }
    }
    resolved
}

/// Apply displacement, push out of buildings, clamp to bounds, re-pin height.
pub(crate) fn resolve_player_motion(
    position: Vec3,
    displacement: Vec3,
    buildings: &[Building],
    bounds: WorldBounds,
    radius: f32,
    pinned_height: f32,
) -> Vec3 {
    let moved = if (position + displacement).is_finite() {
        position + displacement
    } else {
        position
    };
    let pushed = push_out_of_buildings(moved, buildings, radius);
    let mut resolved = bounds.clamp_horizontal(pushed);
    resolved.y = pinned_height;
    resolved
}
