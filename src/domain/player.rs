/// Player motion state machine.
///
/// One call per frame. Reads the body's contact flags from the previous
/// physics step plus this frame's input, and returns the velocity to apply,
/// the pose, an optional animation request and presentation effects.
/// The controller never touches the physics service directly.
///
/// ## Jump Resolution (first match wins, rising edge only)
/// ┌──────────────────────────────┬─────────────────────────────────────┐
/// │ Condition                     │ Result                              │
/// ├──────────────────────────────┼─────────────────────────────────────┤
/// │ blocked down                  │ vy = jump, sound, dust 8            │
/// │ blocked left xor right        │ vx = 1.5·speed away, vy = jump,     │
/// │                               │ face away, refill double jump       │
/// │ can_double_jump               │ vy = double jump, consume flag,     │
/// │                               │ restart clip, sound +200c, dust 6   │
/// │ Otherwise                     │ no-op                               │
/// └──────────────────────────────┴─────────────────────────────────────┘
///
/// ## Pose (first match wins)
/// ┌──────────────────────────────────────┬──────────────┐
/// │ Condition                             │ Pose         │
/// ├──────────────────────────────────────┼──────────────┤
/// │ wall contact, airborne, vy > 0        │ WallSliding  │
/// │ airborne, double-jump clip playing    │ DoubleJumping│
/// │ airborne, vy < 0                      │ Rising       │
/// │ airborne                              │ Falling      │
/// │ grounded, vx ≠ 0                      │ GroundedRun  │
/// │ grounded                              │ GroundedIdle │
/// └──────────────────────────────────────┴──────────────┘

use rand::Rng;

use crate::config::PlayerTuning;
use super::body::{Body, EntityId, Facing, Vec2};
use super::effect::{AnimKey, Effect, SoundKey};
use super::input::InputSnapshot;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PlayerPose {
    GroundedIdle,
    GroundedRun,
    Rising,
    Falling,
    WallSliding,
    DoubleJumping,
}

/// Per-attempt player memory. Rebuilt from scratch on restart.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerRuntimeState {
    pub can_double_jump: bool,
    pub wall_slide_timer: u32,
    pub step_timer: u32,
    pub dust_timer: u32,
    pub was_airborne_last_frame: bool,
    pub facing: Facing,
}

impl PlayerRuntimeState {
    pub fn new(tuning: &PlayerTuning) -> Self {
        PlayerRuntimeState {
            can_double_jump: false,
            wall_slide_timer: slide_preload(tuning),
            step_timer: step_preload(tuning),
            dust_timer: 0,
            was_airborne_last_frame: false,
            facing: Facing::Right,
        }
    }
}

/// What the session tells the controller beyond the body snapshot.
#[derive(Clone, Copy, Debug)]
pub struct PlayerContext {
    pub entity: EntityId,
    /// The one-shot double-jump clip has not completed yet.
    pub double_jump_playing: bool,
}

/// An animation change request. `restart` replays a clip that is already on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AnimRequest {
    pub key: AnimKey,
    pub restart: bool,
}

#[derive(Clone, Debug)]
pub struct PlayerFrame {
    pub velocity: Vec2,
    pub facing: Facing,
    pub pose: PlayerPose,
    /// `None` leaves the current clip alone.
    pub animation: Option<AnimRequest>,
    pub effects: Vec<Effect>,
}

// Effect constants
const JUMP_DUST: u32 = 8;
const DOUBLE_JUMP_DUST: u32 = 6;
const LAND_DUST: u32 = 10;
const DUST_Y: f32 = 12.0;
const LAND_DUST_X: f32 = 15.0;
const RUN_DUST_X: f32 = 8.0;
const DOUBLE_JUMP_DETUNE: i32 = 200;
const SLIDE_VOLUME: f32 = 0.2;
const SLIDE_DETUNE: i32 = 50;
const STEP_VOLUME: f32 = 0.3;
const STEP_DETUNE: i32 = 100;

fn slide_preload(t: &PlayerTuning) -> u32 {
    t.slide_sound_period.saturating_sub(t.slide_sound_margin)
}

fn step_preload(t: &PlayerTuning) -> u32 {
    t.step_period.saturating_sub(t.step_margin)
}

#[derive(Clone, Debug, Default)]
pub struct PlayerController {
    tuning: PlayerTuning,
}

impl PlayerController {
    pub fn new(tuning: PlayerTuning) -> Self {
        PlayerController { tuning }
    }

    pub fn tuning(&self) -> &PlayerTuning {
        &self.tuning
    }

    pub fn update(
        &self,
        state: &mut PlayerRuntimeState,
        body: &Body,
        input: InputSnapshot,
        ctx: PlayerContext,
        rng: &mut impl Rng,
    ) -> PlayerFrame {
        let t = &self.tuning;
        let blocked = body.blocked;
        let grounded = blocked.down;
        let mut effects = Vec::new();
        let mut animation = None;
        let mut double_jump_playing = ctx.double_jump_playing;

        // ── 1. Grounded refresh ──
        if grounded {
            state.can_double_jump = true;
        }

        // ── 2. Horizontal intent ──
        let mut vx = if input.left {
            state.facing = Facing::Left;
            -t.run_speed
        } else if input.right {
            state.facing = Facing::Right;
            t.run_speed
        } else {
            0.0
        };
        let mut vy = body.vel.y;

        // ── 3. Jump ──
        if input.jump {
            if grounded {
                vy = t.jump_impulse;
                effects.push(Effect::sound(SoundKey::Jump, 1.0));
                effects.push(Effect::dust(ctx.entity, 0.0, DUST_Y, JUMP_DUST));
            } else if blocked.one_wall() {
                let away = if blocked.left { Facing::Right } else { Facing::Left };
                vx = away.sign() * t.run_speed * t.wall_jump_factor;
                vy = t.jump_impulse;
                state.facing = away;
                state.can_double_jump = true;
                effects.push(Effect::sound(SoundKey::Jump, 1.0));
            } else if state.can_double_jump {
                vy = t.double_jump_impulse;
                state.can_double_jump = false;
                double_jump_playing = true;
                animation = Some(AnimRequest { key: AnimKey::DoubleJump, restart: true });
                effects.push(Effect::sound_detuned(SoundKey::Jump, 1.0, DOUBLE_JUMP_DETUNE));
                effects.push(Effect::dust(ctx.entity, 0.0, DUST_Y, DOUBLE_JUMP_DUST));
            }
        }

        // ── 4. Wall slide ──
        let wall_sliding = blocked.any_wall() && !grounded && vy > 0.0;
        if wall_sliding {
            vy = t.wall_slide_speed;
            state.wall_slide_timer += 1;
            if state.wall_slide_timer >= t.slide_sound_period {
                let detune = rng.gen_range(-SLIDE_DETUNE..=SLIDE_DETUNE);
                effects.push(Effect::sound_detuned(SoundKey::Slide, SLIDE_VOLUME, detune));
                state.wall_slide_timer = 0;
            }
        } else {
            state.wall_slide_timer = slide_preload(t);
        }

        // ── 5. Pose / animation ──
        let pose = if wall_sliding {
            state.facing = if blocked.left { Facing::Left } else { Facing::Right };
            PlayerPose::WallSliding
        } else if !grounded && double_jump_playing {
            PlayerPose::DoubleJumping
        } else if !grounded {
            if vy < 0.0 { PlayerPose::Rising } else { PlayerPose::Falling }
        } else if vx != 0.0 {
            PlayerPose::GroundedRun
        } else {
            PlayerPose::GroundedIdle
        };
        if animation.is_none() {
            animation = pose_clip(pose).map(|key| AnimRequest { key, restart: false });
        }

        // ── 6. Landing ──
        if grounded && state.was_airborne_last_frame {
            effects.push(Effect::dust(ctx.entity, -LAND_DUST_X, DUST_Y, LAND_DUST));
            effects.push(Effect::dust(ctx.entity, LAND_DUST_X, DUST_Y, LAND_DUST));
            effects.push(Effect::sound(SoundKey::Land, 1.0));
        }
        state.was_airborne_last_frame = !grounded;

        // ── 7. Run cycle ──
        if grounded && vx.abs() > t.run_threshold {
            state.dust_timer += 1;
            if state.dust_timer >= t.dust_period {
                let behind = -state.facing.sign() * RUN_DUST_X;
                effects.push(Effect::dust(ctx.entity, behind, DUST_Y, 1));
                state.dust_timer = 0;
            }
            state.step_timer += 1;
            if state.step_timer >= t.step_period {
                let detune = rng.gen_range(-STEP_DETUNE..=STEP_DETUNE);
                effects.push(Effect::sound_detuned(SoundKey::Step, STEP_VOLUME, detune));
                state.step_timer = 0;
            }
        } else {
            state.dust_timer = 0;
            state.step_timer = step_preload(t);
        }

        PlayerFrame {
            velocity: Vec2::new(vx, vy),
            facing: state.facing,
            pose,
            animation,
            effects,
        }
    }
}

/// Looping clip for a pose. DoubleJumping keeps whatever is playing.
fn pose_clip(pose: PlayerPose) -> Option<AnimKey> {
    match pose {
        PlayerPose::GroundedIdle => Some(AnimKey::Idle),
        PlayerPose::GroundedRun => Some(AnimKey::Run),
        PlayerPose::Rising => Some(AnimKey::Rising),
        PlayerPose::Falling => Some(AnimKey::Falling),
        PlayerPose::WallSliding => Some(AnimKey::WallSlide),
        PlayerPose::DoubleJumping => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::body::{ContactFlags, EntityKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ID: EntityId = EntityId(0);

    fn setup() -> (PlayerController, PlayerRuntimeState, StdRng) {
        let tuning = PlayerTuning::default();
        let state = PlayerRuntimeState::new(&tuning);
        (PlayerController::new(tuning), state, StdRng::seed_from_u64(7))
    }

    fn body(blocked: ContactFlags, vy: f32) -> Body {
        let mut b = Body::new(EntityKind::Player, Vec2::new(32.0, 32.0), 12.0, 14.0);
        b.blocked = blocked;
        b.vel.y = vy;
        b
    }

    fn ground() -> ContactFlags {
        ContactFlags { down: true, ..Default::default() }
    }

    fn air() -> ContactFlags {
        ContactFlags::default()
    }

    fn ctx() -> PlayerContext {
        PlayerContext { entity: ID, double_jump_playing: false }
    }

    fn jump() -> InputSnapshot {
        InputSnapshot { jump: true, ..InputSnapshot::IDLE }
    }

    fn sounds(frame: &PlayerFrame, key: SoundKey) -> usize {
        frame.effects.iter().filter(|e| e.is_sound(key)).count()
    }

    #[test]
    fn ground_jump_then_double_then_nothing() {
        let (ctl, mut st, mut rng) = setup();
        let f = ctl.update(&mut st, &body(ground(), 0.0), jump(), ctx(), &mut rng);
        assert_eq!(f.velocity.y, -260.0);
        assert!(st.can_double_jump);
        assert_eq!(sounds(&f, SoundKey::Jump), 1);
        assert!(f.effects.contains(&Effect::dust(ID, 0.0, 12.0, 8)));

        let f = ctl.update(&mut st, &body(air(), -200.0), jump(), ctx(), &mut rng);
        assert_eq!(f.velocity.y, -230.0);
        assert!(!st.can_double_jump);
        assert_eq!(f.animation, Some(AnimRequest { key: AnimKey::DoubleJump, restart: true }));
        assert_eq!(f.pose, PlayerPose::DoubleJumping);
        assert!(f.effects.contains(&Effect::sound_detuned(SoundKey::Jump, 1.0, 200)));
        assert!(f.effects.contains(&Effect::dust(ID, 0.0, 12.0, 6)));

        let playing = PlayerContext { double_jump_playing: true, ..ctx() };
        let f = ctl.update(&mut st, &body(air(), -150.0), jump(), playing, &mut rng);
        assert_eq!(f.velocity.y, -150.0);
        assert!(f.effects.is_empty());
        assert_eq!(f.animation, None);
    }

    #[test]
    fn no_double_jump_before_first_landing() {
        let (ctl, mut st, mut rng) = setup();
        let f = ctl.update(&mut st, &body(air(), 100.0), jump(), ctx(), &mut rng);
        assert_eq!(f.velocity.y, 100.0);
        assert_eq!(sounds(&f, SoundKey::Jump), 0);
        assert_eq!(f.pose, PlayerPose::Falling);

        ctl.update(&mut st, &body(ground(), 0.0), InputSnapshot::IDLE, ctx(), &mut rng);
        let f = ctl.update(&mut st, &body(air(), 100.0), jump(), ctx(), &mut rng);
        assert_eq!(f.velocity.y, -230.0);
    }

    #[test]
    fn left_wins_over_right() {
        let (ctl, mut st, mut rng) = setup();
        let input = InputSnapshot { left: true, right: true, jump: false };
        let f = ctl.update(&mut st, &body(ground(), 0.0), input, ctx(), &mut rng);
        assert_eq!(f.velocity.x, -160.0);
        assert_eq!(f.facing, Facing::Left);
        assert_eq!(f.pose, PlayerPose::GroundedRun);
    }

    #[test]
    fn no_intent_keeps_facing() {
        let (ctl, mut st, mut rng) = setup();
        st.facing = Facing::Left;
        let f = ctl.update(&mut st, &body(ground(), 0.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(f.velocity.x, 0.0);
        assert_eq!(f.facing, Facing::Left);
        assert_eq!(f.pose, PlayerPose::GroundedIdle);
        assert_eq!(f.animation, Some(AnimRequest { key: AnimKey::Idle, restart: false }));
    }

    #[test]
    fn wall_jump_pushes_away_and_refills() {
        let (ctl, mut st, mut rng) = setup();
        st.can_double_jump = false;
        let wall = ContactFlags { left: true, ..Default::default() };
        let input = InputSnapshot { left: true, right: false, jump: true };
        let f = ctl.update(&mut st, &body(wall, 30.0), input, ctx(), &mut rng);
        assert_eq!(f.velocity.x, 240.0);
        assert_eq!(f.velocity.y, -260.0);
        assert_eq!(f.facing, Facing::Right);
        assert!(st.can_double_jump);
        assert_eq!(f.pose, PlayerPose::Rising);
    }

    #[test]
    fn wall_jump_needs_exactly_one_wall() {
        let (ctl, mut st, mut rng) = setup();
        st.can_double_jump = false;
        let both = ContactFlags { left: true, right: true, ..Default::default() };
        let f = ctl.update(&mut st, &body(both, -10.0), jump(), ctx(), &mut rng);
        assert_eq!(f.velocity.y, -10.0);
        assert_eq!(sounds(&f, SoundKey::Jump), 0);
    }

    #[test]
    fn wall_slide_caps_fall_and_hugs_wall() {
        let (ctl, mut st, mut rng) = setup();
        let wall = ContactFlags { right: true, ..Default::default() };
        st.facing = Facing::Left;
        let f = ctl.update(&mut st, &body(wall, 300.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(f.velocity.y, 50.0);
        assert_eq!(f.pose, PlayerPose::WallSliding);
        assert_eq!(f.facing, Facing::Right);
        assert_eq!(f.animation.map(|a| a.key), Some(AnimKey::WallSlide));
    }

    #[test]
    fn rising_along_wall_is_not_a_slide() {
        let (ctl, mut st, mut rng) = setup();
        let wall = ContactFlags { left: true, ..Default::default() };
        let f = ctl.update(&mut st, &body(wall, -100.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(f.pose, PlayerPose::Rising);
        assert_eq!(f.velocity.y, -100.0);
    }

    #[test]
    fn slide_sound_cadence() {
        let (ctl, mut st, mut rng) = setup();
        let wall = ContactFlags { left: true, ..Default::default() };
        let mut fired = vec![];
        for frame in 1..=25 {
            let f = ctl.update(&mut st, &body(wall, 50.0), InputSnapshot::IDLE, ctx(), &mut rng);
            if sounds(&f, SoundKey::Slide) > 0 {
                fired.push(frame);
            }
        }
        // Pre-loaded to 10: first sound after 5 frames, then every 15
        assert_eq!(fired, vec![5, 20]);

        ctl.update(&mut st, &body(ground(), 0.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(st.wall_slide_timer, 10);
    }

    #[test]
    fn slide_detune_within_range() {
        let (ctl, mut st, mut rng) = setup();
        let wall = ContactFlags { right: true, ..Default::default() };
        for _ in 0..200 {
            let f = ctl.update(&mut st, &body(wall, 50.0), InputSnapshot::IDLE, ctx(), &mut rng);
            for e in &f.effects {
                if let Effect::PlaySound { key: SoundKey::Slide, volume, detune } = e {
                    assert_eq!(*volume, 0.2);
                    assert!((-50..=50).contains(detune));
                }
            }
        }
    }

    #[test]
    fn landing_fires_once() {
        let (ctl, mut st, mut rng) = setup();
        ctl.update(&mut st, &body(air(), 100.0), InputSnapshot::IDLE, ctx(), &mut rng);
        let f = ctl.update(&mut st, &body(ground(), 0.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(sounds(&f, SoundKey::Land), 1);
        assert!(f.effects.contains(&Effect::dust(ID, -15.0, 12.0, 10)));
        assert!(f.effects.contains(&Effect::dust(ID, 15.0, 12.0, 10)));
        let f = ctl.update(&mut st, &body(ground(), 0.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(sounds(&f, SoundKey::Land), 0);
    }

    #[test]
    fn double_jump_clip_holds_until_complete() {
        let (ctl, mut st, mut rng) = setup();
        let playing = PlayerContext { double_jump_playing: true, ..ctx() };
        let f = ctl.update(&mut st, &body(air(), 80.0), InputSnapshot::IDLE, playing, &mut rng);
        assert_eq!(f.pose, PlayerPose::DoubleJumping);
        assert_eq!(f.animation, None);
        let f = ctl.update(&mut st, &body(air(), 80.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(f.pose, PlayerPose::Falling);
    }

    #[test]
    fn run_cycle_dust_and_steps() {
        let (ctl, mut st, mut rng) = setup();
        let right = InputSnapshot { right: true, ..InputSnapshot::IDLE };
        let mut dust_frames = vec![];
        let mut step_frames = vec![];
        for frame in 1..=26 {
            let f = ctl.update(&mut st, &body(ground(), 0.0), right, ctx(), &mut rng);
            if f.effects.contains(&Effect::dust(ID, -8.0, 12.0, 1)) {
                dust_frames.push(frame);
            }
            if sounds(&f, SoundKey::Step) > 0 {
                step_frames.push(frame);
            }
        }
        assert_eq!(dust_frames, vec![6, 12, 18, 24]);
        // Step counter starts pre-loaded at 15
        assert_eq!(step_frames, vec![5, 25]);

        // Stopping resets both counters
        ctl.update(&mut st, &body(ground(), 0.0), InputSnapshot::IDLE, ctx(), &mut rng);
        assert_eq!(st.dust_timer, 0);
        assert_eq!(st.step_timer, 15);
    }

    #[test]
    fn run_dust_trails_behind_when_facing_left() {
        let (ctl, mut st, mut rng) = setup();
        let left = InputSnapshot { left: true, ..InputSnapshot::IDLE };
        let mut found = false;
        for _ in 0..6 {
            let f = ctl.update(&mut st, &body(ground(), 0.0), left, ctx(), &mut rng);
            found |= f.effects.contains(&Effect::dust(ID, 8.0, 12.0, 1));
        }
        assert!(found);
    }
}
