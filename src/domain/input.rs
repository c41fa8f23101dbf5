/// Per-frame input intents.
///
/// Movement is level-triggered (held), jump is edge-triggered (fresh press).
/// Sources are merged upstream; the session only ever sees an InputSnapshot.

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct InputSnapshot {
    pub left: bool,
    pub right: bool,
    /// Rising edge of a jump intent this frame.
    pub jump: bool,
}

impl InputSnapshot {
    pub const IDLE: InputSnapshot = InputSnapshot { left: false, right: false, jump: false };

    /// Combine two sources: any intent from either counts.
    pub fn merge(self, other: InputSnapshot) -> InputSnapshot {
        InputSnapshot {
            left: self.left || other.left,
            right: self.right || other.right,
            jump: self.jump || other.jump,
        }
    }
}

/// Where the session pulls its per-frame intents from.
///
/// Read at most once per frame, and only while the attempt is running, so
/// sources that latch a jump can clear it on read.
pub trait InputSource {
    fn snapshot(&mut self) -> InputSnapshot;
}

impl InputSource for InputSnapshot {
    fn snapshot(&mut self) -> InputSnapshot {
        *self
    }
}

/// On-screen touch buttons.
///
/// Buttons set and clear level-triggered flags. The jump flag stays set
/// after release until it is consumed, so a tap shorter than one frame is
/// never lost; reading it clears it.
#[derive(Clone, Copy, Debug, Default)]
pub struct VirtualJoystick {
    left: bool,
    right: bool,
    jump: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TouchControl {
    Left,
    Right,
    Jump,
}

impl VirtualJoystick {
    pub fn set_control(&mut self, control: TouchControl, active: bool) {
        match control {
            TouchControl::Left => self.left = active,
            TouchControl::Right => self.right = active,
            // Release never clears a pending jump; only consumption does.
            TouchControl::Jump => self.jump |= active,
        }
    }

    /// Pointer left all buttons: drop held movement, keep a latched jump.
    pub fn release_movement(&mut self) {
        self.left = false;
        self.right = false;
    }

    #[cfg(test)]
    pub fn jump_pending(&self) -> bool {
        self.jump
    }
}

impl InputSource for VirtualJoystick {
    fn snapshot(&mut self) -> InputSnapshot {
        let jump = std::mem::take(&mut self.jump);
        InputSnapshot { left: self.left, right: self.right, jump }
    }
}
