/// On-screen touch buttons driven by the mouse.
///
/// Layout (bottom of the terminal):
///   ┌────┐┌────┐                     ┌────┐
///   │ ◄  ││ ►  │                     │ ▲  │
///   └────┘└────┘                     └────┘
///
/// Pressing or dragging onto a button holds it; dragging off every button
/// or releasing drops held movement. Jump latches in the joystick until the
/// session reads it, so a click shorter than a tick still jumps.

use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};

use crate::domain::input::{InputSnapshot, InputSource, TouchControl, VirtualJoystick};

pub const BUTTON_W: usize = 6;
pub const BUTTON_H: usize = 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl Rect {
    fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.x && col < self.x + self.w && row >= self.y && row < self.y + self.h
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TouchLayout {
    pub left: Rect,
    pub right: Rect,
    pub jump: Rect,
}

impl TouchLayout {
    /// Place the buttons along the bottom edge of a `w` x `h` terminal.
    pub fn for_terminal(w: usize, h: usize) -> Self {
        let y = h.saturating_sub(BUTTON_H);
        TouchLayout {
            left: Rect { x: 1, y, w: BUTTON_W, h: BUTTON_H },
            right: Rect { x: 1 + BUTTON_W + 1, y, w: BUTTON_W, h: BUTTON_H },
            jump: Rect { x: w.saturating_sub(BUTTON_W + 1), y, w: BUTTON_W, h: BUTTON_H },
        }
    }

    pub fn hit(&self, col: usize, row: usize) -> Option<TouchControl> {
        [
            (self.left, TouchControl::Left),
            (self.right, TouchControl::Right),
            (self.jump, TouchControl::Jump),
        ]
        .into_iter()
        .find(|(r, _)| r.contains(col, row))
        .map(|(_, c)| c)
    }

    pub fn buttons(&self) -> [(Rect, TouchControl); 3] {
        [
            (self.left, TouchControl::Left),
            (self.right, TouchControl::Right),
            (self.jump, TouchControl::Jump),
        ]
    }
}

pub struct TouchPad {
    layout: TouchLayout,
    joystick: VirtualJoystick,
    /// Button under the pointer while the mouse button is down.
    held: Option<TouchControl>,
}

impl TouchPad {
    pub fn new(term_w: usize, term_h: usize) -> Self {
        TouchPad {
            layout: TouchLayout::for_terminal(term_w, term_h),
            joystick: VirtualJoystick::default(),
            held: None,
        }
    }

    pub fn resize(&mut self, term_w: usize, term_h: usize) {
        self.layout = TouchLayout::for_terminal(term_w, term_h);
    }

    pub fn layout(&self) -> &TouchLayout {
        &self.layout
    }

    pub fn held(&self) -> Option<TouchControl> {
        self.held
    }

    pub fn handle(&mut self, ev: &MouseEvent) {
        let target = self.layout.hit(ev.column as usize, ev.row as usize);
        match ev.kind {
            MouseEventKind::Down(MouseButton::Left) => self.press(target),
            MouseEventKind::Drag(MouseButton::Left) => {
                if target != self.held {
                    self.release();
                    self.press(target);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => self.release(),
            _ => {}
        }
    }

    /// Forget held buttons, e.g. when the level changes. A latched jump is
    /// dropped too.
    pub fn reset(&mut self) {
        self.joystick = VirtualJoystick::default();
        self.held = None;
    }

    fn press(&mut self, target: Option<TouchControl>) {
        if let Some(control) = target {
            self.joystick.set_control(control, true);
        }
        self.held = target;
    }

    fn release(&mut self) {
        if let Some(control) = self.held.take() {
            self.joystick.set_control(control, false);
        }
        self.joystick.release_movement();
    }
}

impl InputSource for TouchPad {
    fn snapshot(&mut self) -> InputSnapshot {
        self.joystick.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent { kind, column, row, modifiers: KeyModifiers::NONE }
    }

    #[test]
    fn layout_sits_on_bottom_rows() {
        let l = TouchLayout::for_terminal(80, 24);
        assert_eq!(l.left.y, 21);
        assert_eq!(l.hit(2, 22), Some(TouchControl::Left));
        assert_eq!(l.hit(9, 23), Some(TouchControl::Right));
        assert_eq!(l.hit(75, 21), Some(TouchControl::Jump));
        assert_eq!(l.hit(40, 22), None);
        assert_eq!(l.hit(2, 10), None);
    }

    #[test]
    fn hold_left_then_release() {
        let mut pad = TouchPad::new(80, 24);
        pad.handle(&mouse(MouseEventKind::Down(MouseButton::Left), 2, 22));
        assert!(pad.snapshot().left);
        assert!(pad.snapshot().left);
        pad.handle(&mouse(MouseEventKind::Up(MouseButton::Left), 2, 22));
        assert_eq!(pad.snapshot(), InputSnapshot::IDLE);
    }

    #[test]
    fn drag_across_buttons_switches_direction() {
        let mut pad = TouchPad::new(80, 24);
        pad.handle(&mouse(MouseEventKind::Down(MouseButton::Left), 2, 22));
        pad.handle(&mouse(MouseEventKind::Drag(MouseButton::Left), 9, 22));
        let s = pad.snapshot();
        assert!(s.right && !s.left);
        // Off every button: movement stops
        pad.handle(&mouse(MouseEventKind::Drag(MouseButton::Left), 40, 22));
        assert_eq!(pad.snapshot(), InputSnapshot::IDLE);
        assert_eq!(pad.held(), None);
    }

    #[test]
    fn quick_jump_click_survives_until_read() {
        let mut pad = TouchPad::new(80, 24);
        pad.handle(&mouse(MouseEventKind::Down(MouseButton::Left), 76, 22));
        pad.handle(&mouse(MouseEventKind::Up(MouseButton::Left), 76, 22));
        assert!(pad.snapshot().jump);
        assert!(!pad.snapshot().jump);
    }

    #[test]
    fn right_button_is_ignored() {
        let mut pad = TouchPad::new(80, 24);
        pad.handle(&mouse(MouseEventKind::Down(MouseButton::Right), 2, 22));
        assert_eq!(pad.snapshot(), InputSnapshot::IDLE);
    }
}
