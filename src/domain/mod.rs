pub mod body;
pub mod effect;
pub mod enemy;
pub mod gate;
pub mod input;
pub mod player;
pub mod tile;
