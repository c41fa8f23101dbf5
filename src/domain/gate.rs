/// Collectible counting and exit activation.
///
/// The exit stays disabled until every spawned collectible has finished
/// its pickup animation. Collection is two-phase: the overlap disables the
/// item immediately (so repeated overlaps are dropped), the count only goes
/// down when the "collected" clip completes on a later frame.

use super::body::{Body, EntityId, Vec2};
use super::effect::{AnimKey, Effect, SoundKey};

const COLLECT_VOLUME: f32 = 0.4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectibleGate {
    remaining: u32,
    exit_activated: bool,
}

impl CollectibleGate {
    pub fn new(collectibles: u32) -> Self {
        CollectibleGate { remaining: collectibles, exit_activated: false }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn exit_activated(&self) -> bool {
        self.exit_activated
    }

    /// Activate immediately if there was nothing to collect.
    /// Returns true exactly when the exit should open now.
    pub fn open_if_empty(&mut self) -> bool {
        self.try_activate()
    }

    /// Player touched `item`. Returns `None` for an item already being collected.
    pub fn on_collected(&mut self, item: EntityId, body: &mut Body) -> Option<Vec<Effect>> {
        if !body.enabled {
            return None;
        }
        body.enabled = false;
        body.vel = Vec2::ZERO;
        Some(vec![
            Effect::sound(SoundKey::Collect, COLLECT_VOLUME),
            Effect::PlayAnimation { entity: item, key: AnimKey::Collected, restart: true },
        ])
    }

    /// The pickup clip of a live item finished. Returns true when this
    /// collection opens the exit.
    pub fn on_collection_finished(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.try_activate()
    }

    fn try_activate(&mut self) -> bool {
        if self.remaining == 0 && !self.exit_activated {
            self.exit_activated = true;
            true
        } else {
            false
        }
    }
}

/// Reveal the exit: enable its body, fade it in and start its idle loop.
pub fn open_exit(exit: EntityId, body: &mut Body, fade_ms: u64) -> Vec<Effect> {
    body.enabled = true;
    vec![
        Effect::SetVisible { entity: exit, visible: true },
        Effect::Fade { entity: exit, from: 0.0, to: 1.0, duration_ms: fade_ms },
        Effect::anim(exit, AnimKey::ExitIdle),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::body::EntityKind;

    fn item() -> Body {
        Body::new(EntityKind::Collectible, Vec2::new(0.0, 0.0), 10.0, 10.0)
    }

    #[test]
    fn duplicate_overlap_is_dropped() {
        let mut gate = CollectibleGate::new(2);
        let mut b = item();
        let fx = gate.on_collected(EntityId(3), &mut b).unwrap();
        assert!(!b.enabled);
        assert!(fx[0].is_sound(SoundKey::Collect));
        assert!(gate.on_collected(EntityId(3), &mut b).is_none());
        // Count only drops when the clip completes
        assert_eq!(gate.remaining(), 2);
    }

    #[test]
    fn last_completion_opens_exactly_once() {
        let mut gate = CollectibleGate::new(2);
        assert!(!gate.on_collection_finished());
        assert_eq!(gate.remaining(), 1);
        assert!(gate.on_collection_finished());
        assert!(gate.exit_activated());
        // Stray completion never underflows or re-opens
        assert!(!gate.on_collection_finished());
        assert_eq!(gate.remaining(), 0);
    }

    #[test]
    fn empty_level_opens_at_start() {
        let mut gate = CollectibleGate::new(0);
        assert!(gate.open_if_empty());
        assert!(!gate.open_if_empty());
        let mut gate = CollectibleGate::new(1);
        assert!(!gate.open_if_empty());
    }

    #[test]
    fn open_exit_enables_body() {
        let mut b = Body::new(EntityKind::ExitMarker, Vec2::new(0.0, 0.0), 16.0, 16.0);
        b.enabled = false;
        let fx = open_exit(EntityId(9), &mut b, 500);
        assert!(b.enabled);
        assert!(fx.contains(&Effect::Fade { entity: EntityId(9), from: 0.0, to: 1.0, duration_ms: 500 }));
    }
}
