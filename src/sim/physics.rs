/// Arcade physics: axis-aligned bodies against a tile grid.
///
/// ## Step (per enabled body, in id order)
///   1. Gravity (if the body has it), fall speed clamped
///   2. Move X, push out of solid tiles → blocked left/right
///   3. Move Y, push out of solid tiles, land on one-way platforms
///      only when coming down from above → blocked down/up
///   4. Report player-vs-body overlaps
///
/// Out-of-bounds cells read as solid, so the map edge is a wall.
/// Contact flags describe only the most recent step. Disabled bodies are
/// neither moved nor reported. There is no body-vs-body collision
/// response; overlaps are reported and the session decides.

use std::collections::BTreeMap;

use crate::config::PhysicsTuning;
use crate::domain::body::{Body, ContactFlags, EntityId, EntityKind, Vec2};
use crate::domain::tile::{TileMap, TileQuery, TILE_SIZE};

/// Largest step integrated at once.
const MAX_DT: f32 = 0.05;
/// Longest single move tested against the grid. Under a tile, so a fast
/// body can never skip a one-tile floor or wall.
const MAX_MOVE: f32 = TILE_SIZE / 2.0;
const EDGE: f32 = 0.001;

/// The player touched another enabled body this step.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Overlap {
    pub other: EntityId,
    pub kind: EntityKind,
}

#[derive(Clone, Debug)]
pub struct ArcadeWorld {
    tiles: TileMap,
    bodies: BTreeMap<EntityId, Body>,
    gravity: f32,
    max_fall_speed: f32,
    paused: bool,
}

impl ArcadeWorld {
    pub fn new(tiles: TileMap, tuning: &PhysicsTuning, gravity_scale: f32) -> Self {
        ArcadeWorld {
            tiles,
            bodies: BTreeMap::new(),
            gravity: tuning.gravity * gravity_scale,
            max_fall_speed: tuning.max_fall_speed,
            paused: false,
        }
    }

    pub fn tiles(&self) -> &TileMap {
        &self.tiles
    }

    pub fn add_body(&mut self, id: EntityId, body: Body) {
        self.bodies.insert(id, body);
    }

    pub fn remove_body(&mut self, id: EntityId) -> Option<Body> {
        self.bodies.remove(&id)
    }

    pub fn body(&self, id: EntityId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut Body> {
        self.bodies.get_mut(&id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (EntityId, &Body)> {
        self.bodies.iter().map(|(&id, b)| (id, b))
    }

    pub fn set_velocity(&mut self, id: EntityId, vel: Vec2) {
        if let Some(b) = self.bodies.get_mut(&id) {
            b.vel = vel;
        }
    }

    pub fn set_velocity_x(&mut self, id: EntityId, vx: f32) {
        if let Some(b) = self.bodies.get_mut(&id) {
            b.vel.x = vx;
        }
    }

    pub fn set_body_enabled(&mut self, id: EntityId, enabled: bool) {
        if let Some(b) = self.bodies.get_mut(&id) {
            b.enabled = enabled;
        }
    }

    #[cfg(test)]
    pub fn contact_flags(&self, id: EntityId) -> ContactFlags {
        self.bodies.get(&id).map(|b| b.blocked).unwrap_or_default()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Advance by `dt` seconds and return the player's overlaps, in id order.
    pub fn step(&mut self, dt: f32) -> Vec<Overlap> {
        if self.paused {
            return vec![];
        }
        let dt = dt.clamp(0.0, MAX_DT);
        let tiles = &self.tiles;
        for body in self.bodies.values_mut() {
            if !body.enabled {
                body.blocked = ContactFlags::default();
                continue;
            }
            if body.gravity {
                body.vel.y = (body.vel.y + self.gravity * dt).min(self.max_fall_speed);
            }
            body.blocked = ContactFlags::default();
            move_x(tiles, body, body.vel.x * dt);
            move_y(tiles, body, body.vel.y * dt);
        }
        self.overlaps()
    }

    fn overlaps(&self) -> Vec<Overlap> {
        let Some(player) = self.bodies.values().find(|b| b.kind == EntityKind::Player && b.enabled) else {
            return vec![];
        };
        self.bodies.iter()
            .filter(|(_, b)| b.kind != EntityKind::Player && b.enabled && player.overlaps(b))
            .map(|(&other, b)| Overlap { other, kind: b.kind })
            .collect()
    }
}

impl TileQuery for ArcadeWorld {
    fn tile_solid_at(&self, x: f32, y: f32) -> bool {
        self.tiles.tile_solid_at(x, y)
    }
}

/// Cells covered by the half-open pixel span [a, b).
fn cell_span(a: f32, b: f32) -> std::ops::RangeInclusive<i32> {
    let first = (a / TILE_SIZE).floor() as i32;
    let last = ((b - EDGE) / TILE_SIZE).floor() as i32;
    first..=last.max(first)
}

/// Split a displacement into equal moves no longer than `MAX_MOVE`.
fn sub_moves(d: f32) -> impl Iterator<Item = f32> {
    let n = (d.abs() / MAX_MOVE).ceil().max(1.0) as usize;
    std::iter::repeat(d / n as f32).take(n)
}

fn move_x(tiles: &TileMap, body: &mut Body, dx: f32) {
    if dx == 0.0 {
        return;
    }
    for part in sub_moves(dx) {
        if !nudge_x(tiles, body, part) {
            break;
        }
    }
}

fn move_y(tiles: &TileMap, body: &mut Body, dy: f32) {
    if dy == 0.0 {
        return;
    }
    for part in sub_moves(dy) {
        if !nudge_y(tiles, body, part) {
            break;
        }
    }
}

/// One short horizontal move. False once the body hits a wall.
fn nudge_x(tiles: &TileMap, body: &mut Body, dx: f32) -> bool {
    let new_x = body.pos.x + dx;
    let rows = cell_span(body.pos.y, body.bottom());
    if dx > 0.0 {
        let col = ((new_x + body.w - EDGE) / TILE_SIZE).floor() as i32;
        if rows.clone().any(|r| tiles.at(col, r).is_solid()) {
            body.pos.x = col as f32 * TILE_SIZE - body.w;
            body.vel.x = 0.0;
            body.blocked.right = true;
            return false;
        }
    } else {
        let col = (new_x / TILE_SIZE).floor() as i32;
        if rows.clone().any(|r| tiles.at(col, r).is_solid()) {
            body.pos.x = (col + 1) as f32 * TILE_SIZE;
            body.vel.x = 0.0;
            body.blocked.left = true;
            return false;
        }
    }
    body.pos.x = new_x;
    true
}

/// One short vertical move. False once the body lands or bumps its head.
fn nudge_y(tiles: &TileMap, body: &mut Body, dy: f32) -> bool {
    let new_y = body.pos.y + dy;
    let cols = cell_span(body.pos.x, body.right());
    if dy > 0.0 {
        let row = ((new_y + body.h - EDGE) / TILE_SIZE).floor() as i32;
        let row_top = row as f32 * TILE_SIZE;
        // One-way platforms only catch a body whose feet were above them.
        let from_above = body.bottom() <= row_top + EDGE;
        let lands = cols.clone().any(|c| {
            let t = tiles.at(c, row);
            t.is_solid() || (t.is_one_way() && from_above)
        });
        if lands {
            body.pos.y = row_top - body.h;
            body.vel.y = 0.0;
            body.blocked.down = true;
            return false;
        }
    } else {
        let row = (new_y / TILE_SIZE).floor() as i32;
        if cols.clone().any(|c| tiles.at(c, row).is_solid()) {
            body.pos.y = (row + 1) as f32 * TILE_SIZE;
            body.vel.y = 0.0;
            body.blocked.up = true;
            return false;
        }
    }
    body.pos.y = new_y;
    true
}
