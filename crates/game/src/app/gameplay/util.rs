use std::f32::consts::TAU;
use std::time::{SystemTime, UNIX_EPOCH};

use engine::Vec3;
use rand::Rng;

pub(crate) const BUILDING_COLORS: [u32; 5] = [0x4a4a4a, 0x6a6a6a, 0x8a8a8a, 0x2a2a2a, 0x5a5a5a];
pub(crate) const NPC_COLORS: [u32; 9] = [
    0xFF6B6B, 0x4ECDC4, 0x45B7D1, 0x96CEB4, 0xFECA57, 0xFF9FF3, 0x54A0FF, 0x48DBFB, 0x1DD1A1,
];

pub(crate) fn pick_color<R: Rng + ?Sized>(rng: &mut R, palette: &[u32]) -> u32 {
    if palette.is_empty() {
        return 0xffffff;
    }
    palette[rng.gen_range(0..palette.len())]
}

/// Uniform sample in `[min, max)`; collapses to `min` when the range is empty.
pub(crate) fn sample_range<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> f32 {
    min + rng.gen::<f32>() * (max - min).max(0.0)
}

pub(crate) fn random_horizontal_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let angle = rng.gen_range(0.0..TAU);
    Vec3::new(angle.cos(), 0.0, angle.sin())
}

pub(crate) fn seed_from_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0x5eed)
}
