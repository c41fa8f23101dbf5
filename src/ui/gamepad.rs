/// Gamepad input via gilrs.
///
/// Button mapping comes from the `[gamepad]` section of config.toml.
/// Default mapping:
///   D-pad / Left Stick X  →  Run left / right
///   D-pad Up / A / B      →  Jump
///   Start                 →  Confirm (next level)
///   Select                →  Quit
///   Y                     →  Restart level
///
/// Without the `gamepad` feature this compiles to a pad that is never
/// connected and never reports input.

#[cfg(feature = "gamepad")]
use gilrs::{Axis, Button, EventType, Gilrs};
use tracing::debug;

use crate::config::GamepadConfig;
use crate::domain::input::InputSnapshot;

#[cfg_attr(not(feature = "gamepad"), allow(dead_code))]
const STICK_DEADZONE: f32 = 0.25;

/// Logical face/shoulder buttons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Btn {
    A,
    B,
    X,
    Y,
    L1,
    R1,
    Start,
    Select,
}

const BTN_COUNT: usize = 8;

impl Btn {
    fn from_name(s: &str) -> Option<Btn> {
        match s.to_uppercase().as_str() {
            "A" | "SOUTH" => Some(Btn::A),
            "B" | "EAST" => Some(Btn::B),
            "X" | "WEST" => Some(Btn::X),
            "Y" | "NORTH" => Some(Btn::Y),
            "L1" | "LB" => Some(Btn::L1),
            "R1" | "RB" => Some(Btn::R1),
            "START" => Some(Btn::Start),
            "SELECT" | "BACK" => Some(Btn::Select),
            _ => None,
        }
    }

    #[cfg(feature = "gamepad")]
    fn from_gilrs(btn: Button) -> Option<Btn> {
        match btn {
            Button::South => Some(Btn::A),
            Button::East => Some(Btn::B),
            Button::West => Some(Btn::X),
            Button::North => Some(Btn::Y),
            Button::LeftTrigger => Some(Btn::L1),
            Button::RightTrigger => Some(Btn::R1),
            Button::Start => Some(Btn::Start),
            Button::Select => Some(Btn::Select),
            _ => None,
        }
    }
}

/// Held (level) and pressed-this-frame (edge).
#[derive(Clone, Copy, Debug, Default)]
struct BtnState {
    held: bool,
    just_pressed: bool,
}

impl BtnState {
    fn set(&mut self, held: bool) {
        if held && !self.held {
            self.just_pressed = true;
        }
        self.held = held;
    }
}

struct ActionMap {
    jump: Vec<Btn>,
    confirm: Vec<Btn>,
    cancel: Vec<Btn>,
    restart: Vec<Btn>,
}

impl ActionMap {
    fn from_config(cfg: &GamepadConfig) -> Self {
        fn parse_list(names: &[String], fallback: &[Btn]) -> Vec<Btn> {
            let parsed: Vec<Btn> = names.iter().filter_map(|s| Btn::from_name(s)).collect();
            if parsed.is_empty() { fallback.to_vec() } else { parsed }
        }
        ActionMap {
            jump: parse_list(&cfg.jump, &[Btn::A, Btn::B]),
            confirm: parse_list(&cfg.confirm, &[Btn::Start]),
            cancel: parse_list(&cfg.cancel, &[Btn::Select]),
            restart: parse_list(&cfg.restart, &[Btn::Y]),
        }
    }
}

pub struct Gamepad {
    #[cfg(feature = "gamepad")]
    gilrs: Option<Gilrs>,
    buttons: [BtnState; BTN_COUNT],
    dpad_left: BtnState,
    dpad_right: BtnState,
    dpad_up: BtnState,
    stick_left: BtnState,
    stick_right: BtnState,
    stick_x: f32,
    actions: ActionMap,
    pub connected: bool,
}

impl Gamepad {
    pub fn new(cfg: &GamepadConfig) -> Self {
        #[cfg(feature = "gamepad")]
        let (gilrs, connected) = match Gilrs::new() {
            Ok(g) => {
                let has_pad = g.gamepads().next().is_some();
                (Some(g), has_pad)
            }
            Err(e) => {
                debug!("gamepad support unavailable: {e}");
                (None, false)
            }
        };
        #[cfg(not(feature = "gamepad"))]
        let connected = false;
        debug!(connected, "gamepad initialized");

        Gamepad {
            #[cfg(feature = "gamepad")]
            gilrs,
            buttons: [BtnState::default(); BTN_COUNT],
            dpad_left: BtnState::default(),
            dpad_right: BtnState::default(),
            dpad_up: BtnState::default(),
            stick_left: BtnState::default(),
            stick_right: BtnState::default(),
            stick_x: 0.0,
            actions: ActionMap::from_config(cfg),
            connected,
        }
    }

    /// Poll once per frame, before reading any action.
    pub fn update(&mut self) {
        for b in self.all_states_mut() {
            b.just_pressed = false;
        }

        #[cfg(feature = "gamepad")]
        self.poll_gilrs();
    }

    #[cfg(feature = "gamepad")]
    fn poll_gilrs(&mut self) {
        let Some(gilrs) = &mut self.gilrs else { return };
        let events: Vec<_> = std::iter::from_fn(|| gilrs.next_event()).collect();

        for event in events {
            match event.event {
                EventType::ButtonPressed(btn, _) => {
                    self.connected = true;
                    self.set_button(btn, true);
                }
                EventType::ButtonReleased(btn, _) => self.set_button(btn, false),
                EventType::AxisChanged(Axis::LeftStickX, value, _) => {
                    self.connected = true;
                    self.stick_x = value;
                }
                EventType::Connected => self.connected = true,
                EventType::Disconnected => {
                    self.connected = false;
                    for b in self.all_states_mut() {
                        *b = BtnState::default();
                    }
                    self.stick_x = 0.0;
                }
                _ => {}
            }
        }

        let x = self.stick_x;
        self.stick_left.set(x < -STICK_DEADZONE);
        self.stick_right.set(x > STICK_DEADZONE);
    }

    #[cfg(feature = "gamepad")]
    fn set_button(&mut self, btn: Button, held: bool) {
        match btn {
            Button::DPadLeft => self.dpad_left.set(held),
            Button::DPadRight => self.dpad_right.set(held),
            Button::DPadUp => self.dpad_up.set(held),
            other => {
                if let Some(b) = Btn::from_gilrs(other) {
                    self.buttons[b as usize].set(held);
                }
            }
        }
    }

    fn all_states_mut(&mut self) -> impl Iterator<Item = &mut BtnState> {
        self.buttons.iter_mut().chain([
            &mut self.dpad_left,
            &mut self.dpad_right,
            &mut self.dpad_up,
            &mut self.stick_left,
            &mut self.stick_right,
        ])
    }

    fn any_just_pressed(&self, btns: &[Btn]) -> bool {
        btns.iter().any(|&b| self.buttons[b as usize].just_pressed)
    }

    // ── Actions ──

    /// Movement and jump intents for this frame.
    pub fn intents(&self) -> InputSnapshot {
        if !self.connected {
            return InputSnapshot::IDLE;
        }
        InputSnapshot {
            left: self.dpad_left.held || self.stick_left.held,
            right: self.dpad_right.held || self.stick_right.held,
            jump: self.dpad_up.just_pressed || self.any_just_pressed(&self.actions.jump),
        }
    }

    pub fn confirm_pressed(&self) -> bool {
        self.any_just_pressed(&self.actions.confirm)
    }

    pub fn cancel_pressed(&self) -> bool {
        self.any_just_pressed(&self.actions.cancel)
    }

    pub fn restart_pressed(&self) -> bool {
        self.any_just_pressed(&self.actions.restart)
    }
}
