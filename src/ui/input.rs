/// Keyboard and mouse state from crossterm events.
///
/// Movement needs "is the key down", jump needs "was it pressed since the
/// last drain". Terminals only report key releases with the keyboard
/// enhancement protocol; without it a key counts as released once no
/// press or repeat has arrived for `RELEASE_AFTER`.
///
/// Mouse events are kept raw for the on-screen touch buttons.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent};

use crate::domain::input::InputSnapshot;

/// Longer than the usual key-repeat interval, so a held key never flickers.
const RELEASE_AFTER: Duration = Duration::from_millis(160);

const LEFT_KEYS: &[KeyCode] = &[KeyCode::Left, KeyCode::Char('a'), KeyCode::Char('A')];
const RIGHT_KEYS: &[KeyCode] = &[KeyCode::Right, KeyCode::Char('d'), KeyCode::Char('D')];
const JUMP_KEYS: &[KeyCode] = &[
    KeyCode::Up, KeyCode::Char('w'), KeyCode::Char('W'), KeyCode::Char(' '), KeyCode::Enter,
];

pub struct InputState {
    /// Last press or repeat per key.
    seen: HashMap<KeyCode, Instant>,
    /// Keys that went down during the last drain.
    pressed: Vec<KeyCode>,
    /// Every key event of the last drain, for Ctrl-C.
    keys: Vec<KeyEvent>,
    pub mouse_events: Vec<MouseEvent>,
    pub resized: bool,
    /// Trust Release events. Set only when the enhancement is active.
    pub honor_release: bool,
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            seen: HashMap::with_capacity(16),
            pressed: Vec::with_capacity(8),
            keys: Vec::with_capacity(8),
            mouse_events: Vec::with_capacity(8),
            resized: false,
            honor_release: false,
        }
    }

    /// Read every pending terminal event without blocking. Once per frame.
    pub fn drain_events(&mut self) {
        self.pressed.clear();
        self.keys.clear();
        self.mouse_events.clear();
        self.resized = false;

        while event::poll(Duration::ZERO).unwrap_or(false) {
            match event::read() {
                Ok(ev) => self.on_event(ev, Instant::now()),
                Err(_) => break,
            }
        }

        let now = Instant::now();
        self.seen.retain(|_, t| now.duration_since(*t) < RELEASE_AFTER);
    }

    fn on_event(&mut self, ev: Event, now: Instant) {
        match ev {
            Event::Key(key) => {
                self.keys.push(key);
                match key.kind {
                    KeyEventKind::Release => {
                        if self.honor_release {
                            self.seen.remove(&key.code);
                        }
                    }
                    KeyEventKind::Press => {
                        if !self.held_at(key.code, now) {
                            self.pressed.push(key.code);
                        }
                        self.seen.insert(key.code, now);
                    }
                    // Auto-repeat keeps a key held, never a new press
                    KeyEventKind::Repeat => {
                        self.seen.insert(key.code, now);
                    }
                }
            }
            Event::Mouse(m) => self.mouse_events.push(m),
            Event::Resize(..) => self.resized = true,
            _ => {}
        }
    }

    pub fn any_held(&self, codes: &[KeyCode]) -> bool {
        let now = Instant::now();
        codes.iter().any(|&c| self.held_at(c, now))
    }

    /// Went down during the last drain (edge trigger).
    pub fn any_pressed(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|c| self.pressed.contains(c))
    }

    /// Movement and jump intents from the keyboard.
    pub fn intents(&self) -> InputSnapshot {
        InputSnapshot {
            left: self.any_held(LEFT_KEYS),
            right: self.any_held(RIGHT_KEYS),
            jump: self.any_pressed(JUMP_KEYS),
        }
    }

    pub fn ctrl_c_pressed(&self) -> bool {
        self.keys.iter().any(|k| {
            k.modifiers.contains(KeyModifiers::CONTROL) && matches!(k.code, KeyCode::Char('c' | 'C'))
        })
    }

    fn held_at(&self, code: KeyCode, now: Instant) -> bool {
        self.seen.get(&code).map_or(false, |t| now.duration_since(*t) < RELEASE_AFTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, kind: KeyEventKind) -> Event {
        Event::Key(KeyEvent { code, modifiers: KeyModifiers::NONE, kind, state: KeyEventState::NONE })
    }

    #[test]
    fn held_arrow_runs_and_fresh_space_jumps() {
        let mut input = InputState::new();
        let now = Instant::now();
        input.on_event(key(KeyCode::Left, KeyEventKind::Press), now);
        input.on_event(key(KeyCode::Char(' '), KeyEventKind::Press), now);
        let i = input.intents();
        assert!(i.left && !i.right && i.jump);

        // Next frame: repeat keeps it held but is not a fresh press
        input.pressed.clear();
        input.on_event(key(KeyCode::Left, KeyEventKind::Repeat), Instant::now());
        let i = input.intents();
        assert!(i.left && !i.jump);
    }

    #[test]
    fn late_repeat_of_held_jump_is_not_a_press() {
        let mut input = InputState::new();
        let t0 = Instant::now();
        input.on_event(key(KeyCode::Char(' '), KeyEventKind::Press), t0);
        assert!(input.intents().jump);

        // First auto-repeat arrives after the OS delay, past RELEASE_AFTER
        input.pressed.clear();
        input.on_event(key(KeyCode::Char(' '), KeyEventKind::Repeat), t0 + Duration::from_millis(300));
        assert!(!input.intents().jump);
    }

    #[test]
    fn wasd_maps_like_arrows() {
        let mut input = InputState::new();
        let now = Instant::now();
        input.on_event(key(KeyCode::Char('d'), KeyEventKind::Press), now);
        input.on_event(key(KeyCode::Char('W'), KeyEventKind::Press), now);
        let i = input.intents();
        assert!(i.right && i.jump);
    }

    #[test]
    fn release_only_counts_when_enhanced() {
        let mut input = InputState::new();
        let now = Instant::now();
        input.on_event(key(KeyCode::Right, KeyEventKind::Press), now);
        input.on_event(key(KeyCode::Right, KeyEventKind::Release), now);
        assert!(input.intents().right);
        input.honor_release = true;
        input.on_event(key(KeyCode::Right, KeyEventKind::Release), now);
        assert!(!input.intents().right);
    }

    #[test]
    fn ctrl_c_is_detected() {
        let mut input = InputState::new();
        input.on_event(
            Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Instant::now(),
        );
        assert!(input.ctrl_c_pressed());
    }
}
