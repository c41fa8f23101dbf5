/// Enemy patrol state machine.
///
/// Enemies walk until a wall or a ledge is ahead, then turn around and wait.
/// They never look for the player; contact is resolved by the session from
/// physics overlaps.

use crate::config::EnemyTuning;
use super::body::{Body, Facing};
use super::effect::AnimKey;
use super::tile::TileQuery;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EnemyState {
    Patrolling,
    /// Standing still until the session clock passes `until_ms`.
    Paused { until_ms: u64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnemyRuntimeState {
    pub facing: Facing,
    pub state: EnemyState,
}

impl EnemyRuntimeState {
    pub fn new(facing: Facing) -> Self {
        EnemyRuntimeState { facing, state: EnemyState::Patrolling }
    }
}

impl Default for EnemyRuntimeState {
    fn default() -> Self {
        EnemyRuntimeState::new(Facing::Left)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnemyFrame {
    pub velocity_x: f32,
    pub facing: Facing,
    pub animation: Option<AnimKey>,
}

#[derive(Clone, Debug, Default)]
pub struct EnemyController {
    tuning: EnemyTuning,
}

impl EnemyController {
    pub fn new(tuning: EnemyTuning) -> Self {
        EnemyController { tuning }
    }

    pub fn update(
        &self,
        state: &mut EnemyRuntimeState,
        body: &Body,
        tiles: &impl TileQuery,
        now_ms: u64,
    ) -> EnemyFrame {
        let t = &self.tuning;
        let (velocity_x, animation) = match state.state {
            EnemyState::Patrolling => {
                if self.should_turn(state.facing, body, tiles) {
                    state.facing = state.facing.flipped();
                    state.state = EnemyState::Paused { until_ms: now_ms + t.pause_ms };
                    (0.0, Some(AnimKey::EnemyIdle))
                } else {
                    (t.speed * state.facing.sign(), None)
                }
            }
            EnemyState::Paused { until_ms } if now_ms > until_ms => {
                state.state = EnemyState::Patrolling;
                (t.speed * state.facing.sign(), Some(AnimKey::EnemyRun))
            }
            EnemyState::Paused { .. } => (0.0, None),
        };
        EnemyFrame { velocity_x, facing: state.facing, animation }
    }

    /// Wall in the walking direction, or no ground just past the leading foot.
    fn should_turn(&self, facing: Facing, body: &Body, tiles: &impl TileQuery) -> bool {
        let walled = match facing {
            Facing::Left => body.blocked.left,
            Facing::Right => body.blocked.right,
        };
        if walled {
            return true;
        }
        if !body.grounded() {
            return false;
        }
        let probe_x = match facing {
            Facing::Left => body.pos.x - self.tuning.probe_ahead,
            Facing::Right => body.right() + self.tuning.probe_ahead,
        };
        let probe_y = body.bottom() + self.tuning.probe_down;
        !tiles.tile_solid_at(probe_x, probe_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::body::{ContactFlags, EntityKind, Vec2};
    use crate::domain::tile::tests::map_from;

    // Row 2 floor spans columns 2..=5; body stands on it (bottom at y=32).
    const MAP: &[&str] = &[
        "        ",
        "        ",
        "  ####  ",
        "########",
    ];

    fn enemy_at(x: f32) -> Body {
        let mut b = Body::new(EntityKind::Enemy, Vec2::new(x, 18.0), 12.0, 14.0);
        b.blocked = ContactFlags { down: true, ..Default::default() };
        b
    }

    #[test]
    fn patrols_on_solid_ground() {
        let map = map_from(MAP);
        let ctl = EnemyController::default();
        let mut st = EnemyRuntimeState::new(Facing::Left);
        let f = ctl.update(&mut st, &enemy_at(48.0), &map, 0);
        assert_eq!(f.velocity_x, -50.0);
        assert_eq!(st.state, EnemyState::Patrolling);
        assert_eq!(f.animation, None);
    }

    #[test]
    fn ledge_turns_and_pauses_then_resumes() {
        let map = map_from(MAP);
        let ctl = EnemyController::default();
        let mut st = EnemyRuntimeState::new(Facing::Left);
        // Leading edge at x=33, probe at x=31 over the gap in row 2
        let body = enemy_at(33.0);
        let f = ctl.update(&mut st, &body, &map, 1000);
        assert_eq!(f.velocity_x, 0.0);
        assert_eq!(f.facing, Facing::Right);
        assert_eq!(st.state, EnemyState::Paused { until_ms: 3000 });
        assert_eq!(f.animation, Some(AnimKey::EnemyIdle));

        // Exactly at the deadline is still paused
        let f = ctl.update(&mut st, &body, &map, 3000);
        assert_eq!(f.velocity_x, 0.0);
        assert_eq!(f.facing, Facing::Right);

        let f = ctl.update(&mut st, &body, &map, 3016);
        assert_eq!(f.velocity_x, 50.0);
        assert_eq!(st.state, EnemyState::Patrolling);
        assert_eq!(f.animation, Some(AnimKey::EnemyRun));
    }

    #[test]
    fn wall_ahead_turns() {
        let map = map_from(MAP);
        let ctl = EnemyController::default();
        let mut st = EnemyRuntimeState::new(Facing::Right);
        let mut body = enemy_at(40.0);
        body.blocked.right = true;
        let f = ctl.update(&mut st, &body, &map, 0);
        assert_eq!(f.facing, Facing::Left);
        assert!(matches!(st.state, EnemyState::Paused { .. }));
    }

    #[test]
    fn wall_behind_is_ignored() {
        let map = map_from(MAP);
        let ctl = EnemyController::default();
        let mut st = EnemyRuntimeState::new(Facing::Right);
        let mut body = enemy_at(40.0);
        body.blocked.left = true;
        let f = ctl.update(&mut st, &body, &map, 0);
        assert_eq!(f.velocity_x, 50.0);
    }

    #[test]
    fn airborne_enemy_skips_ledge_probe() {
        let map = map_from(MAP);
        let ctl = EnemyController::default();
        let mut st = EnemyRuntimeState::new(Facing::Left);
        let mut body = enemy_at(33.0);
        body.blocked.down = false;
        let f = ctl.update(&mut st, &body, &map, 0);
        assert_eq!(f.velocity_x, -50.0);
        assert_eq!(st.state, EnemyState::Patrolling);
    }

    #[test]
    fn flips_exactly_once_per_stop() {
        let map = map_from(MAP);
        let ctl = EnemyController::default();
        let mut st = EnemyRuntimeState::new(Facing::Left);
        let body = enemy_at(33.0);
        ctl.update(&mut st, &body, &map, 0);
        for now in (16..2000).step_by(16) {
            ctl.update(&mut st, &body, &map, now);
        }
        assert_eq!(st.facing, Facing::Right);
    }
}
