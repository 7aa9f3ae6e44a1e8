/// 3D vector in world grid units.
/// x/y index the terrain grid, z is altitude in vertical units.

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../soaring-game/src/generated/")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Shorthand constructor
pub fn vec3(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Horizontal taxicab distance, ignoring altitude.
pub fn manhattan_xy(a: Vec3, b: Vec3) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

/// Nearest terrain cell for a position.
///
/// A position that rounds to a negative cell is off the map, the same
/// caller error as indexing past the far edge of a [`crate::grid::Field`].
pub fn grid_cell(v: Vec3) -> (usize, usize) {
    let (x, y) = (v.x.round(), v.y.round());
    debug_assert!(x >= 0.0 && y >= 0.0, "position ({}, {}) is off the map", v.x, v.y);
    (x as usize, y as usize)
}
