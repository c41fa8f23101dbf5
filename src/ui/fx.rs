/// Host-side presentation state.
///
/// Turns the session's effect stream into what the renderer draws:
/// visibility, fades, tints, facing, dust particles, camera shake and the
/// message bar. Runs on its own clock because a restart resets the session
/// clock to zero.
///
/// ## Camera / Viewport
///
/// The camera works in tile cells, not pixels:
///   - `(x, y)` is the world cell drawn at the top-left of the viewport
///   - Follows the player with a dead zone of 20% per side
///   - Maps smaller than the viewport are centered (negative origin)

use std::collections::HashMap;

use rand::Rng;

use crate::domain::body::{EntityId, Facing};
use crate::domain::effect::Effect;
use crate::sim::event::GameEvent;
use crate::sim::physics::ArcadeWorld;

/// How long a hook or host message stays on the message bar.
pub const MESSAGE_MS: u64 = 4000;
const PARTICLE_LIFE_MS: u64 = 450;
/// Horizontal scatter of a dust puff, px/s.
const PARTICLE_SPREAD: f32 = 40.0;
const PARTICLE_RISE: f32 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Fade {
    from: f32,
    to: f32,
    start_ms: u64,
    duration_ms: u64,
}

/// Per-entity presentation flags.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityFx {
    pub visible: bool,
    pub facing: Facing,
    pub tint: Option<u32>,
    fade: Option<Fade>,
}

impl Default for EntityFx {
    fn default() -> Self {
        EntityFx { visible: true, facing: Facing::Right, tint: None, fade: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// World pixels.
    pub x: f32,
    pub y: f32,
    vx: f32,
    vy: f32,
    born_ms: u64,
}

#[derive(Clone, Copy, Debug)]
struct Shake {
    until_ms: u64,
    intensity: f32,
}

pub struct Presentation {
    now_ms: u64,
    entities: HashMap<EntityId, EntityFx>,
    particles: Vec<Particle>,
    shake: Option<Shake>,
    message: Option<(String, u64)>,
    pub camera: Camera,
}

impl Presentation {
    pub fn new() -> Self {
        Presentation {
            now_ms: 0,
            entities: HashMap::new(),
            particles: vec![],
            shake: None,
            message: None,
            camera: Camera::new(),
        }
    }

    /// Drop everything tied to the previous level.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.particles.clear();
        self.shake = None;
        self.message = None;
        self.camera.placed = false;
    }

    pub fn tick(&mut self, dt_ms: u64) {
        self.now_ms += dt_ms;
        let now = self.now_ms;
        let dt = dt_ms as f32 / 1000.0;
        for p in &mut self.particles {
            p.x += p.vx * dt;
            p.y += p.vy * dt;
        }
        self.particles.retain(|p| now - p.born_ms < PARTICLE_LIFE_MS);
        if self.shake.map_or(false, |s| now >= s.until_ms) {
            self.shake = None;
        }
        if self.message.as_ref().map_or(false, |(_, until)| now >= *until) {
            self.message = None;
        }
    }

    /// Apply one session event. `world` locates particle emitters.
    pub fn apply(&mut self, event: &GameEvent, world: &ArcadeWorld, rng: &mut impl Rng) {
        match event {
            GameEvent::Effect(effect) => self.apply_effect(effect, world, rng),
            GameEvent::LevelRestarted => {
                // Tints and hidden flags belong to the failed attempt.
                self.entities.clear();
                self.particles.clear();
                self.camera.placed = false;
            }
            GameEvent::Message(text) => self.show_message(text),
            _ => {}
        }
    }

    pub fn show_message(&mut self, text: &str) {
        self.message = Some((text.to_string(), self.now_ms + MESSAGE_MS));
    }

    fn apply_effect(&mut self, effect: &Effect, world: &ArcadeWorld, rng: &mut impl Rng) {
        match *effect {
            Effect::SetVisible { entity, visible } => self.entry(entity).visible = visible,
            Effect::SetFacing { entity, facing } => self.entry(entity).facing = facing,
            Effect::Tint { entity, rgb } => self.entry(entity).tint = Some(rgb),
            Effect::Fade { entity, from, to, duration_ms } => {
                let start_ms = self.now_ms;
                self.entry(entity).fade = Some(Fade { from, to, start_ms, duration_ms });
            }
            Effect::EmitParticles { entity, offset, count } => {
                let Some(body) = world.body(entity) else { return };
                let x = body.center_x() + offset.x;
                let y = body.pos.y + body.h * 0.5 + offset.y;
                for _ in 0..count {
                    self.particles.push(Particle {
                        x,
                        y,
                        vx: rng.gen_range(-PARTICLE_SPREAD..=PARTICLE_SPREAD),
                        vy: -rng.gen_range(0.0..=PARTICLE_RISE),
                        born_ms: self.now_ms,
                    });
                }
            }
            Effect::CameraShake { duration_ms, intensity } => {
                self.shake = Some(Shake { until_ms: self.now_ms + duration_ms, intensity });
            }
            Effect::PlaySound { .. } | Effect::PlayMusic { .. } | Effect::PlayAnimation { .. } => {}
        }
    }

    fn entry(&mut self, entity: EntityId) -> &mut EntityFx {
        self.entities.entry(entity).or_default()
    }

    // ── Queries ──

    pub fn entity(&self, entity: EntityId) -> EntityFx {
        self.entities.get(&entity).copied().unwrap_or_default()
    }

    /// Current opacity in [0, 1].
    pub fn alpha(&self, entity: EntityId) -> f32 {
        let Some(fade) = self.entities.get(&entity).and_then(|e| e.fade) else { return 1.0 };
        if fade.duration_ms == 0 {
            return fade.to;
        }
        let t = (self.now_ms.saturating_sub(fade.start_ms)) as f32 / fade.duration_ms as f32;
        fade.from + (fade.to - fade.from) * t.min(1.0)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_ref().map(|(m, _)| m.as_str())
    }

    #[cfg(test)]
    pub fn shaking(&self) -> bool {
        self.shake.is_some()
    }

    /// Camera jitter in cells for this frame. Never zero while shaking so a
    /// small viewport still visibly moves.
    pub fn shake_offset(&self, rng: &mut impl Rng) -> (i32, i32) {
        let Some(shake) = self.shake else { return (0, 0) };
        let reach = ((shake.intensity * self.camera.view_w as f32).round() as i32).max(1);
        (rng.gen_range(-reach..=reach), rng.gen_range(-1..=1))
    }
}

// ══════════════════════════════════════════════════════════════
// Camera
// ══════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct Camera {
    pub x: i32,
    pub y: i32,
    /// Viewport size in cells; set by the renderer from the terminal size.
    pub view_w: usize,
    pub view_h: usize,
    /// False until the first follow after a (re)load, which snaps.
    placed: bool,
}

impl Camera {
    pub fn new() -> Self {
        Camera { x: 0, y: 0, view_w: 0, view_h: 0, placed: false }
    }

    /// Track a target cell. Snaps to center it on the first call after a
    /// reset, then only scrolls when the target leaves the dead zone.
    pub fn follow(&mut self, target: (i32, i32), world_w: usize, world_h: usize) {
        if self.view_w == 0 || self.view_h == 0 {
            return;
        }
        let snap = !self.placed;
        self.x = follow_axis(self.x, self.view_w, target.0, world_w, snap);
        self.y = follow_axis(self.y, self.view_h, target.1, world_h, snap);
        self.placed = true;
    }
}

fn follow_axis(pos: i32, view: usize, target: i32, world: usize, snap: bool) -> i32 {
    let (view, world) = (view as i32, world as i32);
    if world <= view {
        return -((view - world) / 2);
    }
    let pos = if snap {
        target - view / 2
    } else {
        let margin = view / 5;
        if target < pos + margin {
            target - margin
        } else if target > pos + view - margin - 1 {
            target - view + margin + 1
        } else {
            pos
        }
    };
    pos.clamp(0, world - view)
}
