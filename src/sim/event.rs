/// Events emitted during a simulation step.
/// The presentation layer consumes these for animation/sound.

use crate::domain::effect::Effect;

#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    Effect(Effect),
    ItemCollected { remaining: u32 },
    ExitActivated,
    LevelCompleted,
    PlayerKilled,
    LevelRestarted,
    Message(String),
}
