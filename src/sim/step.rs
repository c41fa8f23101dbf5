/// The step function: advances a level session by one frame.
///
/// Processing order:
///   1. Advance the clock
///   2. Fire due tasks (animation completions, restart)
///   3. Player controller (Running only; the only place input is read)
///   4. Enemy controllers in spawn order (Running or Completed)
///   5. Physics integration
///   6. Overlaps: enemies, then the exit, then collectibles
///
/// Tasks are only fired in (2), so a clip that ends or a restart that is
/// scheduled during a step is seen at the start of a later one.

use tracing::info;

use crate::domain::body::{EntityId, EntityKind, Vec2};
use crate::domain::effect::{AnimKey, Effect, SoundKey};
use crate::domain::input::InputSource;
use crate::domain::player::PlayerContext;
use super::event::GameEvent;
use super::physics::Overlap;
use super::session::{LevelSession, SessionPhase};
use super::timer::TaskKey;

const FAIL_VOLUME: f32 = 1.0;
const FAIL_TINT: u32 = 0xff3030;

// ══════════════════════════════════════════════════════════════
// Main entry point
// ══════════════════════════════════════════════════════════════

pub fn step(session: &mut LevelSession, input: &mut impl InputSource, dt_ms: u64) -> Vec<GameEvent> {
    session.now_ms += dt_ms;

    if fire_due_tasks(session) {
        // Fresh attempt; it starts moving on the next step.
        return session.take_pending();
    }

    if session.phase == SessionPhase::Running {
        update_player(session, input);
    }
    if !matches!(session.phase, SessionPhase::FailedRestarting { .. }) {
        update_enemies(session);
    }

    let overlaps = session.world.step(dt_ms as f32 / 1000.0);
    resolve_overlaps(session, overlaps);

    session.take_pending()
}

// ══════════════════════════════════════════════════════════════
// Scheduled tasks
// ══════════════════════════════════════════════════════════════

/// Returns true if the session was rebuilt.
fn fire_due_tasks(session: &mut LevelSession) -> bool {
    for key in session.scheduler.take_due(session.now_ms) {
        match key {
            TaskKey::AnimationComplete(entity) => finish_animation(session, entity),
            TaskKey::RestartLevel => {
                restart(session);
                return true;
            }
        }
    }
    false
}

fn finish_animation(session: &mut LevelSession, entity: EntityId) {
    if session.anims.finish(entity) == Some(AnimKey::Collected) {
        finish_collection(session, entity);
    }
}

fn finish_collection(session: &mut LevelSession, item: EntityId) {
    // Already removed items are ignored.
    let Some(idx) = session.collectibles.iter().position(|&id| id == item) else { return };
    session.collectibles.remove(idx);
    session.world.remove_body(item);
    session.anims.remove(item);

    let opens = session.gate.on_collection_finished();
    session.pending.push(GameEvent::ItemCollected { remaining: session.gate.remaining() });
    if opens {
        let fade_ms = session.session_tuning.exit_fade_ms;
        session.open_exit(fade_ms);
    }
}

fn restart(session: &mut LevelSession) {
    info!(level = %session.config.name, "restarting level");
    session.pending.push(GameEvent::LevelRestarted);
    session.initialize();
}

// ══════════════════════════════════════════════════════════════
// Controllers
// ══════════════════════════════════════════════════════════════

fn update_player(session: &mut LevelSession, input: &mut impl InputSource) {
    let player = session.player;
    let Some(body) = session.world.body(player).filter(|b| b.enabled).cloned() else { return };

    let snapshot = input.snapshot();
    let ctx = PlayerContext {
        entity: player,
        double_jump_playing: session.anims.is_playing(player, AnimKey::DoubleJump),
    };
    let prev_facing = session.player_state.facing;
    let frame = session.player_ctl.update(
        &mut session.player_state,
        &body,
        snapshot,
        ctx,
        &mut session.rng,
    );

    session.world.set_velocity(player, frame.velocity);
    if frame.facing != prev_facing {
        session.emit(Effect::SetFacing { entity: player, facing: frame.facing });
    }
    if let Some(req) = frame.animation {
        session.emit(Effect::PlayAnimation { entity: player, key: req.key, restart: req.restart });
    }
    for effect in frame.effects {
        session.emit(effect);
    }
}

fn update_enemies(session: &mut LevelSession) {
    let mut effects = vec![];
    for (id, state) in session.enemies.iter_mut() {
        let Some(body) = session.world.body(*id).filter(|b| b.enabled) else { continue };
        let prev_facing = state.facing;
        let frame = session.enemy_ctl.update(state, body, &session.world, session.now_ms);
        session.world.set_velocity_x(*id, frame.velocity_x);
        if frame.facing != prev_facing {
            effects.push(Effect::SetFacing { entity: *id, facing: frame.facing });
        }
        if let Some(key) = frame.animation {
            effects.push(Effect::anim(*id, key));
        }
    }
    for effect in effects {
        session.emit(effect);
    }
}

// ══════════════════════════════════════════════════════════════
// Overlaps
// ══════════════════════════════════════════════════════════════

fn overlap_priority(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Enemy => 0,
        EntityKind::ExitMarker => 1,
        EntityKind::Collectible => 2,
        EntityKind::Player => 3,
    }
}

fn resolve_overlaps(session: &mut LevelSession, mut overlaps: Vec<Overlap>) {
    overlaps.sort_by_key(|o| overlap_priority(o.kind));
    for overlap in overlaps {
        // Terminal transitions are one-shot; the rest of the frame is ignored.
        if session.phase != SessionPhase::Running {
            return;
        }
        match overlap.kind {
            EntityKind::Enemy => fail_attempt(session),
            EntityKind::ExitMarker => complete_level(session),
            EntityKind::Collectible => begin_collection(session, overlap.other),
            EntityKind::Player => {}
        }
    }
}

fn begin_collection(session: &mut LevelSession, item: EntityId) {
    let Some(body) = session.world.body_mut(item) else { return };
    let effects = session.gate.on_collected(item, body);
    for effect in effects.into_iter().flatten() {
        session.emit(effect);
    }
}

fn fail_attempt(session: &mut LevelSession) {
    let tuning = session.session_tuning.clone();
    let restart_at_ms = session.now_ms + tuning.restart_delay_ms;
    let player = session.player;

    session.phase = SessionPhase::FailedRestarting { restart_at_ms };
    session.world.set_body_enabled(player, false);
    session.world.set_paused(true);
    session.scheduler.schedule(TaskKey::RestartLevel, restart_at_ms);

    session.emit(Effect::sound(SoundKey::Fail, FAIL_VOLUME));
    session.emit(Effect::CameraShake { duration_ms: tuning.shake_ms, intensity: tuning.shake_intensity });
    session.emit(Effect::Tint { entity: player, rgb: FAIL_TINT });
    session.pending.push(GameEvent::PlayerKilled);
    info!(level = %session.config.name, at_ms = session.now_ms, "player killed");
}

fn complete_level(session: &mut LevelSession) {
    let player = session.player;
    session.phase = SessionPhase::Completed;
    session.world.set_velocity(player, Vec2::ZERO);
    session.world.set_body_enabled(player, false);
    session.pending.push(GameEvent::LevelCompleted);
    info!(level = %session.config.name, at_ms = session.now_ms, "level completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::domain::body::Facing;
    use crate::domain::input::{InputSnapshot, TouchControl, VirtualJoystick};
    use crate::sim::level::{parse_level, LevelHooks};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DT: u64 = 16;

    fn session_with(map: &str, hooks: LevelHooks) -> LevelSession {
        let def = parse_level(map, "test").unwrap();
        LevelSession::with_rng(def, hooks, &GameConfig::default(), StdRng::seed_from_u64(11))
    }

    fn session(map: &str) -> LevelSession {
        session_with(map, LevelHooks::default())
    }

    fn idle() -> InputSnapshot {
        InputSnapshot::IDLE
    }

    fn run(s: &mut LevelSession, input: InputSnapshot, frames: usize) -> Vec<GameEvent> {
        let mut events = vec![];
        for _ in 0..frames {
            let mut i = input;
            events.extend(step(s, &mut i, DT));
        }
        events
    }

    fn has_sound(events: &[GameEvent], key: SoundKey) -> bool {
        events.iter().any(|e| matches!(e, GameEvent::Effect(fx) if fx.is_sound(key)))
    }

    fn move_onto_player(s: &mut LevelSession, id: EntityId) {
        let pos = s.player_body().unwrap().pos;
        s.world.body_mut(id).unwrap().pos = pos;
    }

    #[test]
    fn empty_level_opens_exit_at_start() {
        let mut s = session("# Empty field\n#      #\n#P   F #\n########");
        let exit = s.exit_id().unwrap();
        assert!(s.exit_activated());
        assert!(s.world.body(exit).unwrap().enabled);
        let events = step(&mut s, &mut idle(), DT);
        assert!(events.contains(&GameEvent::ExitActivated));
        assert!(events.contains(&GameEvent::Effect(Effect::Fade {
            entity: exit, from: 0.0, to: 1.0, duration_ms: 0,
        })));
    }

    #[test]
    fn enemy_overlap_beats_exit_in_same_frame() {
        let mut s = session("# Ambush\n#         #\n#P  E  F  #\n###########");
        let enemy = s.enemies[0].0;
        let exit = s.exit_id().unwrap();
        move_onto_player(&mut s, enemy);
        move_onto_player(&mut s, exit);

        let events = step(&mut s, &mut idle(), DT);
        assert!(events.contains(&GameEvent::PlayerKilled));
        assert!(!events.contains(&GameEvent::LevelCompleted));
        assert!(has_sound(&events, SoundKey::Fail));
        assert!(matches!(s.phase(), SessionPhase::FailedRestarting { restart_at_ms: 516 }));
        assert!(!s.player_body().unwrap().enabled);
        assert!(s.world.is_paused());

        // Nothing more happens until the timer fires
        let events = run(&mut s, idle(), 30);
        assert!(!events.contains(&GameEvent::PlayerKilled));
        assert!(!events.contains(&GameEvent::LevelRestarted));

        let events = run(&mut s, idle(), 3);
        assert!(events.contains(&GameEvent::LevelRestarted));
        assert_eq!(s.phase(), SessionPhase::Running);
        assert!(s.player_body().unwrap().enabled);
        assert_eq!(s.attempt(), 2);
        assert!(!s.world.is_paused());
    }

    #[test]
    fn last_item_opens_exit_when_clip_ends() {
        let mut s = session("# Orchard\n#         #\n#P*    F  #\n###########");
        let exit = s.exit_id().unwrap();
        let item = s.collectibles[0];
        assert!(!s.world.body(exit).unwrap().enabled);

        let right = InputSnapshot { right: true, ..InputSnapshot::IDLE };
        let mut picked_at = None;
        for _ in 0..20 {
            let events = step(&mut s, &mut { right }, DT);
            if has_sound(&events, SoundKey::Collect) {
                picked_at = Some(s.now_ms());
                break;
            }
        }
        let picked_at = picked_at.expect("player never reached the item");
        assert!(!s.world.body(item).unwrap().enabled);
        assert_eq!(s.remaining(), 1);

        let mut collect_sounds = 0;
        let mut finished = vec![];
        while s.now_ms() < picked_at + 400 {
            let events = step(&mut s, &mut { right }, DT);
            if has_sound(&events, SoundKey::Collect) {
                collect_sounds += 1;
            }
            if events.contains(&GameEvent::ItemCollected { remaining: 0 }) {
                finished = events;
                break;
            }
            assert!(!s.world.body(exit).unwrap().enabled);
        }
        assert_eq!(collect_sounds, 0);
        assert!(s.now_ms() >= picked_at + 350);
        assert!(finished.contains(&GameEvent::ExitActivated));
        assert!(finished.contains(&GameEvent::Effect(Effect::Fade {
            entity: exit, from: 0.0, to: 1.0, duration_ms: 500,
        })));
        assert!(s.world.body(item).is_none());
        assert_eq!(s.remaining(), 0);
        assert!(s.world.body(exit).unwrap().enabled);
    }

    #[test]
    fn reaching_exit_completes_once() {
        let mut s = session("# Short hop\n#      #\n#P F   #\n########");
        let right = InputSnapshot { right: true, ..InputSnapshot::IDLE };
        let events = run(&mut s, right, 30);
        assert_eq!(events.iter().filter(|e| **e == GameEvent::LevelCompleted).count(), 1);
        assert_eq!(s.phase(), SessionPhase::Completed);
        let body = s.player_body().unwrap();
        assert!(!body.enabled);
        assert_eq!(body.vel, Vec2::ZERO);

        // Input is no longer read, so a latched touch jump stays pending
        let mut pad = VirtualJoystick::default();
        pad.set_control(TouchControl::Jump, true);
        step(&mut s, &mut pad, DT);
        assert!(pad.jump_pending());
    }

    #[test]
    fn jump_double_jump_then_nothing() {
        let mut s = session("# Flat\n#        #\n#        #\n#   P    #\n##########");
        run(&mut s, idle(), 5);
        assert!(s.player_body().unwrap().grounded());

        let jump = InputSnapshot { jump: true, ..InputSnapshot::IDLE };
        let events = run(&mut s, jump, 1);
        assert!(has_sound(&events, SoundKey::Jump));
        assert!(s.player_body().unwrap().vel.y < -240.0);
        assert!(s.player_state().can_double_jump);

        run(&mut s, idle(), 3);
        let events = run(&mut s, jump, 1);
        assert!(events.contains(&GameEvent::Effect(Effect::PlayAnimation {
            entity: s.player_id(), key: AnimKey::DoubleJump, restart: true,
        })));
        assert!(!s.player_state().can_double_jump);
        let vy = s.player_body().unwrap().vel.y;
        assert!(vy < -210.0 && vy > -230.0);

        let events = run(&mut s, jump, 1);
        assert!(!has_sound(&events, SoundKey::Jump));
    }

    #[test]
    fn slide_down_wall_then_jump_off() {
        let mut s = session(
            "# Shaft\n#      #\n#P     #\n#      #\n#      #\n#      #\n#      #\n#      #\n#      #\n#      #\n########",
        );
        let player = s.player_id();
        let hug = InputSnapshot { left: true, ..InputSnapshot::IDLE };

        // First frame pushes into the wall, the next ones slide
        let mut events = run(&mut s, hug, 4);
        let body = s.player_body().unwrap();
        assert!(body.blocked.left && !body.grounded());
        // Slide speed plus one frame of gravity
        assert!((body.vel.y - (50.0 + 600.0 * 0.016)).abs() < 1e-3);
        assert_eq!(s.anims.current(player), Some(AnimKey::WallSlide));
        assert!(events.contains(&GameEvent::Effect(Effect::PlayAnimation {
            entity: player, key: AnimKey::WallSlide, restart: false,
        })));
        assert!(!s.player_state().can_double_jump);

        let jump = InputSnapshot { left: true, right: false, jump: true };
        events = run(&mut s, jump, 1);
        let body = s.player_body().unwrap();
        assert_eq!(body.vel.x, 240.0);
        assert!(body.vel.y < -240.0);
        assert!(!body.blocked.left);
        assert!(s.player_state().can_double_jump);
        assert_eq!(s.player_state().facing, Facing::Right);
        assert!(has_sound(&events, SoundKey::Jump));
    }

    #[test]
    fn enemies_keep_walking_after_completion() {
        let mut s = session("# Busy exit\n#            #\n#PF     E    #\n##############");
        let right = InputSnapshot { right: true, ..InputSnapshot::IDLE };
        run(&mut s, right, 10);
        assert_eq!(s.phase(), SessionPhase::Completed);
        let enemy = s.enemies[0].0;
        let x0 = s.world.body(enemy).unwrap().pos.x;
        run(&mut s, idle(), 10);
        assert!(s.world.body(enemy).unwrap().pos.x < x0);
    }

    #[test]
    fn hook_runs_on_every_initialization() {
        let hooks = LevelHooks { on_loaded: Some(|s: &mut LevelSession| s.post_message("go")) };
        let mut s = session_with("# Hooked\n#         #\n#P  E  F  #\n###########", hooks);
        let events = step(&mut s, &mut idle(), DT);
        assert!(events.contains(&GameEvent::Message("go".into())));

        let enemy = s.enemies[0].0;
        move_onto_player(&mut s, enemy);
        let mut events = run(&mut s, idle(), 1);
        events.extend(run(&mut s, idle(), 40));
        assert!(events.contains(&GameEvent::LevelRestarted));
        assert!(events.contains(&GameEvent::Message("go".into())));
    }
}
