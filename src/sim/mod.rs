pub mod anim;
pub mod event;
pub mod level;
pub mod physics;
pub mod session;
pub mod step;
pub mod timer;
