/// Which clip each entity is playing, and when one-shots end.
///
/// ## Clip table
/// ┌──────────────────┬────────┬─────┬──────────┐
/// │ Clip              │ Frames │ FPS │ Loops    │
/// ├──────────────────┼────────┼─────┼──────────┤
/// │ idle              │ 11     │ 20  │ yes      │
/// │ run               │ 12     │ 20  │ yes      │
/// │ rising / falling  │ 1      │ 1   │ yes      │
/// │ wall-slide        │ 1      │ 1   │ yes      │
/// │ double-jump       │ 6      │ 20  │ one-shot │
/// │ collectible-idle  │ 17     │ 20  │ yes      │
/// │ collected         │ 7      │ 20  │ one-shot │
/// │ exit-idle         │ 8      │ 15  │ yes      │
/// │ enemy-idle        │ 4      │ 8   │ yes      │
/// │ enemy-run         │ 6      │ 12  │ yes      │
/// └──────────────────┴────────┴─────┴──────────┘
///
/// Starting a one-shot schedules `AnimationComplete(entity)` for when its
/// last frame ends. Switching clips before that cancels the task.

use std::collections::HashMap;

use crate::domain::body::EntityId;
use crate::domain::effect::AnimKey;
use super::timer::{Scheduler, TaskKey};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Clip {
    pub frames: u32,
    pub fps: u32,
    pub looping: bool,
}

impl Clip {
    const fn looped(frames: u32, fps: u32) -> Clip {
        Clip { frames, fps, looping: true }
    }

    const fn once(frames: u32, fps: u32) -> Clip {
        Clip { frames, fps, looping: false }
    }

    pub fn duration_ms(self) -> u64 {
        u64::from(self.frames) * 1000 / u64::from(self.fps.max(1))
    }
}

pub fn clip(key: AnimKey) -> Clip {
    match key {
        AnimKey::Idle => Clip::looped(11, 20),
        AnimKey::Run => Clip::looped(12, 20),
        AnimKey::Rising | AnimKey::Falling | AnimKey::WallSlide => Clip::looped(1, 1),
        AnimKey::DoubleJump => Clip::once(6, 20),
        AnimKey::CollectibleIdle => Clip::looped(17, 20),
        AnimKey::Collected => Clip::once(7, 20),
        AnimKey::ExitIdle => Clip::looped(8, 15),
        AnimKey::EnemyIdle => Clip::looped(4, 8),
        AnimKey::EnemyRun => Clip::looped(6, 12),
    }
}

#[derive(Clone, Copy, Debug)]
struct Playing {
    key: AnimKey,
    started_ms: u64,
    finished: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AnimationTracker {
    playing: HashMap<EntityId, Playing>,
}

impl AnimationTracker {
    pub fn new() -> Self {
        AnimationTracker::default()
    }

    /// Start `key` on `entity`. Returns false when nothing changed: the same
    /// clip is already on and `restart` was not asked for.
    pub fn play(
        &mut self,
        entity: EntityId,
        key: AnimKey,
        restart: bool,
        now_ms: u64,
        scheduler: &mut Scheduler,
    ) -> bool {
        if !restart && self.current(entity) == Some(key) {
            return false;
        }
        let c = clip(key);
        self.playing.insert(entity, Playing { key, started_ms: now_ms, finished: false });
        let task = TaskKey::AnimationComplete(entity);
        if c.looping {
            scheduler.cancel(task);
        } else {
            scheduler.schedule(task, now_ms + c.duration_ms());
        }
        true
    }

    pub fn current(&self, entity: EntityId) -> Option<AnimKey> {
        self.playing.get(&entity).map(|p| p.key)
    }

    /// `key` is on and, for a one-shot, has not reached its end yet.
    pub fn is_playing(&self, entity: EntityId, key: AnimKey) -> bool {
        self.playing.get(&entity).map_or(false, |p| p.key == key && !p.finished)
    }

    /// Mark a one-shot as ended; it holds its last frame.
    pub fn finish(&mut self, entity: EntityId) -> Option<AnimKey> {
        let p = self.playing.get_mut(&entity)?;
        p.finished = true;
        Some(p.key)
    }

    pub fn remove(&mut self, entity: EntityId) {
        self.playing.remove(&entity);
    }

    /// Frame index to draw at `now_ms`.
    pub fn frame(&self, entity: EntityId, now_ms: u64) -> u32 {
        let Some(p) = self.playing.get(&entity) else { return 0 };
        let c = clip(p.key);
        if p.finished {
            return c.frames.saturating_sub(1);
        }
        let elapsed = now_ms.saturating_sub(p.started_ms);
        let n = (elapsed * u64::from(c.fps) / 1000) as u32;
        if c.looping { n % c.frames.max(1) } else { n.min(c.frames.saturating_sub(1)) }
    }
}
