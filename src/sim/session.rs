/// LevelSession: one attempt at one level.
///
/// Owns every entity, the physics world, the controllers' runtime state,
/// the collectible gate and the clock. A failed attempt is rebuilt from the
/// stored level definition rather than patched back into shape, so nothing
/// from the previous attempt can leak into the next.
///
/// ## Phases
///   Running ──exit overlap──▶ Completed        (terminal, host moves on)
///   Running ──enemy overlap─▶ FailedRestarting ──timer──▶ Running (rebuilt)

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::{GameConfig, PhysicsTuning, PlayerTuning, SessionTuning};
use crate::domain::body::{Body, EntityId, EntityKind, Facing, Vec2};
use crate::domain::effect::{AnimKey, Effect};
use crate::domain::enemy::{EnemyController, EnemyRuntimeState};
use crate::domain::gate::{self, CollectibleGate};
use crate::domain::player::{PlayerController, PlayerRuntimeState};
use crate::domain::tile::TILE_SIZE;
use super::anim::AnimationTracker;
use super::event::GameEvent;
use super::level::{LevelConfig, LevelDef, LevelHooks};
use super::physics::ArcadeWorld;
use super::timer::Scheduler;

// Body sizes in pixels, bottom-centered in the spawn cell.
const PLAYER_SIZE: (f32, f32) = (12.0, 14.0);
const ENEMY_SIZE: (f32, f32) = (14.0, 12.0);
const COLLECTIBLE_SIZE: (f32, f32) = (10.0, 10.0);
const EXIT_SIZE: (f32, f32) = (16.0, 16.0);

const MUSIC_VOLUME: f32 = 0.5;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionPhase {
    Running,
    Completed,
    FailedRestarting { restart_at_ms: u64 },
}

/// What the renderer needs to draw one entity.
#[derive(Clone, Copy, Debug)]
pub struct EntityView<'a> {
    pub id: EntityId,
    pub body: &'a Body,
    pub anim: Option<AnimKey>,
    pub frame: u32,
}

pub struct LevelSession {
    pub(super) def: LevelDef,
    pub(super) hooks: LevelHooks,
    pub(super) config: LevelConfig,
    pub(super) session_tuning: SessionTuning,
    player_tuning: PlayerTuning,
    physics_tuning: PhysicsTuning,

    pub(super) world: ArcadeWorld,
    pub(super) player: EntityId,
    pub(super) player_state: PlayerRuntimeState,
    pub(super) player_ctl: PlayerController,
    pub(super) enemy_ctl: EnemyController,
    /// Spawn order.
    pub(super) enemies: Vec<(EntityId, EnemyRuntimeState)>,
    /// Items still alive, including ones mid-pickup.
    pub(super) collectibles: Vec<EntityId>,
    pub(super) exit: Option<EntityId>,
    pub(super) gate: CollectibleGate,
    pub(super) anims: AnimationTracker,
    pub(super) scheduler: Scheduler,
    pub(super) phase: SessionPhase,
    pub(super) now_ms: u64,
    pub(super) rng: StdRng,
    pub(super) pending: Vec<GameEvent>,
    total_collectibles: usize,
    attempt: u32,
}

impl LevelSession {
    pub fn new(def: LevelDef, hooks: LevelHooks, config: &GameConfig) -> Self {
        LevelSession::with_rng(def, hooks, config, StdRng::from_entropy())
    }

    /// Same as `new` with a caller-supplied generator (sound detune).
    pub fn with_rng(def: LevelDef, hooks: LevelHooks, config: &GameConfig, rng: StdRng) -> Self {
        let mut player_tuning = config.player.clone();
        let mut enemy_tuning = config.enemy.clone();
        if let Some(speed) = def.config.run_speed {
            player_tuning.run_speed = speed;
        }
        if let Some(speed) = def.config.enemy_speed {
            enemy_tuning.speed = speed;
        }

        let mut session = LevelSession {
            config: def.config.clone(),
            def,
            hooks,
            session_tuning: config.session.clone(),
            player_ctl: PlayerController::new(player_tuning.clone()),
            enemy_ctl: EnemyController::new(enemy_tuning),
            player_state: PlayerRuntimeState::new(&player_tuning),
            player_tuning,
            physics_tuning: config.physics.clone(),
            world: ArcadeWorld::new(Default::default(), &config.physics, 1.0),
            player: EntityId(0),
            enemies: vec![],
            collectibles: vec![],
            exit: None,
            gate: CollectibleGate::new(0),
            anims: AnimationTracker::new(),
            scheduler: Scheduler::new(),
            phase: SessionPhase::Running,
            now_ms: 0,
            rng,
            pending: vec![],
            total_collectibles: 0,
            attempt: 0,
        };
        session.initialize();
        session
    }

    /// Build a fresh attempt from the level definition.
    pub(super) fn initialize(&mut self) {
        let data = self.def.build();
        self.config = data.config.clone();
        self.attempt += 1;
        self.world = ArcadeWorld::new(data.tiles, &self.physics_tuning, self.config.gravity_scale);
        self.player_state = PlayerRuntimeState::new(&self.player_tuning);
        self.enemies.clear();
        self.collectibles.clear();
        self.exit = None;
        self.anims = AnimationTracker::new();
        self.scheduler = Scheduler::new();
        self.phase = SessionPhase::Running;
        self.now_ms = 0;

        let mut next_id = 0u32;
        let mut alloc = || {
            let id = EntityId(next_id);
            next_id += 1;
            id
        };

        self.player = alloc();
        self.world.add_body(self.player, spawn_body(EntityKind::Player, self.config.spawn, PLAYER_SIZE));
        self.emit(Effect::SetFacing { entity: self.player, facing: Facing::Right });
        self.emit(Effect::anim(self.player, AnimKey::Idle));

        for &cell in &data.enemies {
            let id = alloc();
            self.world.add_body(id, spawn_body(EntityKind::Enemy, cell, ENEMY_SIZE));
            let state = EnemyRuntimeState::default();
            self.emit(Effect::SetFacing { entity: id, facing: state.facing });
            self.emit(Effect::anim(id, AnimKey::EnemyRun));
            self.enemies.push((id, state));
        }

        for &cell in &data.collectibles {
            let id = alloc();
            let mut body = spawn_body(EntityKind::Collectible, cell, COLLECTIBLE_SIZE);
            body.gravity = false;
            self.world.add_body(id, body);
            self.emit(Effect::anim(id, AnimKey::CollectibleIdle));
            self.collectibles.push(id);
        }

        if let Some(cell) = data.exit {
            let id = alloc();
            let mut body = spawn_body(EntityKind::ExitMarker, cell, EXIT_SIZE);
            body.gravity = false;
            body.enabled = false;
            self.world.add_body(id, body);
            self.emit(Effect::SetVisible { entity: id, visible: false });
            self.exit = Some(id);
        }

        if let Some(key) = self.config.music.clone() {
            self.emit(Effect::PlayMusic { key, volume: MUSIC_VOLUME });
        }

        self.total_collectibles = self.collectibles.len();
        self.gate = CollectibleGate::new(self.collectibles.len() as u32);
        info!(
            level = %self.config.name,
            attempt = self.attempt,
            collectibles = self.collectibles.len(),
            excluded = data.excluded,
            enemies = self.enemies.len(),
            "level session started"
        );
        // Nothing to collect: the exit is there from the first frame.
        if self.gate.open_if_empty() {
            self.open_exit(0);
        }

        if let Some(on_loaded) = self.hooks.on_loaded {
            on_loaded(self);
        }
    }

    /// Route an effect to the presentation stream. Animation requests go
    /// through the tracker first and are dropped if they change nothing.
    pub(super) fn emit(&mut self, effect: Effect) {
        if let Effect::PlayAnimation { entity, key, restart } = effect {
            if !self.anims.play(entity, key, restart, self.now_ms, &mut self.scheduler) {
                return;
            }
        }
        self.pending.push(GameEvent::Effect(effect));
    }

    pub(super) fn open_exit(&mut self, fade_ms: u64) {
        let Some(exit) = self.exit else {
            warn!(level = %self.config.name, "all collected but level has no exit");
            return;
        };
        let Some(body) = self.world.body_mut(exit) else { return };
        for effect in gate::open_exit(exit, body, fade_ms) {
            self.emit(effect);
        }
        self.pending.push(GameEvent::ExitActivated);
        debug!(level = %self.config.name, "exit activated");
    }

    /// Events queued since the last step, such as the effects of building a
    /// new session. `step` drains this itself.
    pub fn take_pending(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Queue a message for the host's message bar.
    pub fn post_message(&mut self, text: &str) {
        self.pending.push(GameEvent::Message(text.to_string()));
    }

    // ── Queries ──

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn level_config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn world(&self) -> &ArcadeWorld {
        &self.world
    }

    pub fn player_id(&self) -> EntityId {
        self.player
    }

    pub fn player_body(&self) -> Option<&Body> {
        self.world.body(self.player)
    }

    pub fn player_state(&self) -> &PlayerRuntimeState {
        &self.player_state
    }

    pub fn exit_id(&self) -> Option<EntityId> {
        self.exit
    }

    pub fn remaining(&self) -> u32 {
        self.gate.remaining()
    }

    pub fn total_collectibles(&self) -> usize {
        self.total_collectibles
    }

    pub fn exit_activated(&self) -> bool {
        self.gate.exit_activated()
    }

    /// Every live entity, in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityView<'_>> {
        self.world.bodies().map(move |(id, body)| EntityView {
            id,
            body,
            anim: self.anims.current(id),
            frame: self.anims.frame(id, self.now_ms),
        })
    }
}

fn spawn_body(kind: EntityKind, cell: Vec2, (w, h): (f32, f32)) -> Body {
    let pos = Vec2::new(cell.x + (TILE_SIZE - w) * 0.5, cell.y + TILE_SIZE - h);
    Body::new(kind, pos, w, h)
}
