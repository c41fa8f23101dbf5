/// Presentation requests emitted by the controllers.
///
/// The core never plays sound or draws anything itself. It describes what
/// should happen and the host (renderer, sound engine) carries it out.

use super::body::{EntityId, Facing, Vec2};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SoundKey {
    Jump,
    Land,
    Collect,
    Step,
    Slide,
    Fail,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AnimKey {
    Idle,
    Run,
    Rising,
    Falling,
    WallSlide,
    DoubleJump,
    CollectibleIdle,
    Collected,
    ExitIdle,
    EnemyIdle,
    EnemyRun,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// `detune` is in cents (100 = one semitone).
    PlaySound { key: SoundKey, volume: f32, detune: i32 },
    /// Burst of dust at `offset` from the entity's center.
    EmitParticles { entity: EntityId, offset: Vec2, count: u32 },
    /// `restart`: replay from the first frame even if this clip is already playing.
    PlayAnimation { entity: EntityId, key: AnimKey, restart: bool },
    SetFacing { entity: EntityId, facing: Facing },
    SetVisible { entity: EntityId, visible: bool },
    Fade { entity: EntityId, from: f32, to: f32, duration_ms: u64 },
    CameraShake { duration_ms: u64, intensity: f32 },
    Tint { entity: EntityId, rgb: u32 },
    PlayMusic { key: String, volume: f32 },
}

impl Effect {
    pub fn sound(key: SoundKey, volume: f32) -> Effect {
        Effect::PlaySound { key, volume, detune: 0 }
    }

    pub fn sound_detuned(key: SoundKey, volume: f32, detune: i32) -> Effect {
        Effect::PlaySound { key, volume, detune }
    }

    pub fn dust(entity: EntityId, x: f32, y: f32, count: u32) -> Effect {
        Effect::EmitParticles { entity, offset: Vec2::new(x, y), count }
    }

    pub fn anim(entity: EntityId, key: AnimKey) -> Effect {
        Effect::PlayAnimation { entity, key, restart: false }
    }

    #[cfg(test)]
    pub fn is_sound(&self, wanted: SoundKey) -> bool {
        matches!(self, Effect::PlaySound { key, .. } if *key == wanted)
    }
}
