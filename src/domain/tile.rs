/// Tile types and their properties.
/// Properties are queried via methods, not stored as flags,
/// so tile semantics are centralized here.

/// Edge length of one map tile in world pixels.
pub const TILE_SIZE: f32 = 16.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Tile {
    #[default]
    Empty,
    Solid,    // Blocks from every side
    Platform, // One-way: only blocks bodies falling onto its top edge
}

impl Tile {
    /// Does this tile block movement from every side?
    pub fn is_solid(self) -> bool {
        matches!(self, Tile::Solid)
    }

    /// Can a body stand on top of this tile?
    pub fn is_ground(self) -> bool {
        matches!(self, Tile::Solid | Tile::Platform)
    }

    /// Only collides with bodies coming down onto it.
    pub fn is_one_way(self) -> bool {
        matches!(self, Tile::Platform)
    }
}

/// Read-only tile lookup in world-pixel coordinates.
///
/// The enemy ledge probe only needs this much of the physics service,
/// which keeps the patrol logic testable against a plain grid.
pub trait TileQuery {
    /// Is there standable ground at world point (x, y)? Out of bounds is solid.
    fn tile_solid_at(&self, x: f32, y: f32) -> bool;
}

/// A rectangular tile grid, row-major, `tiles[y][x]`.
#[derive(Clone, Debug, Default)]
pub struct TileMap {
    pub tiles: Vec<Vec<Tile>>,
    pub width: usize,
    pub height: usize,
}

impl TileMap {
    pub fn new(tiles: Vec<Vec<Tile>>) -> Self {
        let height = tiles.len();
        let width = tiles.first().map_or(0, |r| r.len());
        TileMap { tiles, width, height }
    }

    /// Tile at grid cell (x, y). Out of bounds counts as solid wall.
    #[inline]
    pub fn at(&self, x: i32, y: i32) -> Tile {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return Tile::Solid;
        }
        self.tiles[y as usize][x as usize]
    }

    /// Tile containing world point (px, py).
    #[inline]
    pub fn at_point(&self, px: f32, py: f32) -> Tile {
        self.at((px / TILE_SIZE).floor() as i32, (py / TILE_SIZE).floor() as i32)
    }
}

impl TileQuery for TileMap {
    fn tile_solid_at(&self, x: f32, y: f32) -> bool {
        self.at_point(x, y).is_ground()
    }
}
