use engine::{Aabb, Vec3};
use rand::Rng;
use tracing::{debug, info};

use super::movement::{is_inside_any_building, WorldBounds};
use super::util::{pick_color, sample_range, BUILDING_COLORS};
use crate::app::config::CityConfig;

const ROAD_INTERVAL: i32 = 3;
const SPAWN_AREA_FRACTION: f32 = 0.9;
const SPAWN_ATTEMPTS_PER_POSITION: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GridCell {
    pub(crate) i: i32,
    pub(crate) j: i32,
}

impl GridCell {
    pub(crate) fn is_road(self) -> bool {
        self.i.rem_euclid(ROAD_INTERVAL) == 0 || self.j.rem_euclid(ROAD_INTERVAL) == 0
    }

    pub(crate) fn center(self, block_size: f32) -> Vec3 {
        Vec3::new(self.i as f32 * block_size, 0.0, self.j as f32 * block_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Building {
    pub(crate) cell: GridCell,
    pub(crate) volume: Aabb,
    pub(crate) color: u32,
}

/// Grid-laid city of box buildings separated by road rows and columns.
/// Buildings only change through `generate`/`clear_city`, never during a tick.
#[derive(Debug, Clone)]
pub(crate) struct City {
    config: CityConfig,
    buildings: Vec<Building>,
    roads: Vec<GridCell>,
    generation: u64,
}

impl City {
    pub(crate) fn new(config: CityConfig) -> Self {
        Self {
            config,
            buildings: Vec::new(),
            roads: Vec::new(),
            generation: 0,
        }
    }

    pub(crate) fn city_size(&self) -> f32 {
        self.config.city_size
    }

    pub(crate) fn bounds(&self) -> WorldBounds {
        WorldBounds::new(self.config.city_size)
    }

    /// Cells run from `-grid_extent` to `grid_extent` inclusive on both axes.
    pub(crate) fn grid_extent(&self) -> i32 {
        (self.config.city_size / self.config.block_size).floor() as i32
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.clear_city();
        let extent = self.grid_extent();

        for i in -extent..=extent {
            for j in -extent..=extent {
                let cell = GridCell { i, j };
                if cell.is_road() {
                    self.roads.push(cell);
                    continue;
                }
                if rng.gen_bool(self.config.building_probability) {
                    self.create_building(cell, rng);
                }
            }
        }

        self.generation = self.generation.saturating_add(1);
        info!(
            generation = self.generation,
            grid_extent = extent,
            buildings = self.buildings.len(),
            road_cells = self.roads.len(),
            "city_generated"
        );
    }

    fn create_building<R: Rng + ?Sized>(&mut self, cell: GridCell, rng: &mut R) {
        let block = self.config.block_size;
        let height = sample_range(rng, self.config.min_height, self.config.max_height);
        let width = block * sample_range(rng, self.config.min_footprint, self.config.max_footprint);
        let depth = block * sample_range(rng, self.config.min_footprint, self.config.max_footprint);
        let color = pick_color(rng, &BUILDING_COLORS);

        let base = cell.center(block);
        let volume = Aabb::from_center_size(
            Vec3::new(base.x, height * 0.5, base.z),
            Vec3::new(width, height, depth),
        );
        self.buildings.push(Building {
            cell,
            volume,
            color,
        });
    }

    pub(crate) fn clear_city(&mut self) {
        if !self.buildings.is_empty() || !self.roads.is_empty() {
            debug!(
                buildings = self.buildings.len(),
                road_cells = self.roads.len(),
                "city_cleared"
            );
        }
        self.buildings.clear();
        self.roads.clear();
    }

    pub(crate) fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    #[cfg(test)]
    pub(crate) fn roads(&self) -> &[GridCell] {
        &self.roads
    }

    pub(crate) fn is_inside_building(&self, point: Vec3) -> bool {
        is_inside_any_building(point, &self.buildings)
    }

    /// Rejection-samples up to `count` ground points outside every building.
    /// May return fewer than requested; callers decide how to cover the gap.
    pub(crate) fn find_valid_positions<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Vec<Vec3> {
        let span = self.config.city_size * 2.0 * SPAWN_AREA_FRACTION;
        let attempts = count.saturating_mul(SPAWN_ATTEMPTS_PER_POSITION);
        let mut positions = Vec::new();

        for _ in 0..attempts {
            if positions.len() >= count {
                break;
            }
            let x = (rng.gen::<f32>() - 0.5) * span;
            let z = (rng.gen::<f32>() - 0.5) * span;
            let candidate = Vec3::new(x, 0.0, z);
            if !self.is_inside_building(candidate) {
                positions.push(candidate);
            }
        }

        if positions.len() < count {
            debug!(
                requested = count,
                found = positions.len(),
                attempts,
                "valid_position_shortfall"
            );
        }
        positions
    }
}
