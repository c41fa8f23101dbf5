/// Entities and their physics bodies.
///
/// A body is a snapshot of what the physics service knows about one entity.
/// Controllers read it; only the physics service integrates positions and
/// writes contact flags.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct EntityId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntityKind {
    Player,
    Enemy,
    Collectible,
    ExitMarker,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Facing {
    Left,
    #[default]
    Right,
}

impl Facing {
    /// Horizontal sign of this facing: -1 or +1.
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }

    pub fn flipped(self) -> Facing {
        match self {
            Facing::Left => Facing::Right,
            Facing::Right => Facing::Left,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }
}

/// Axis contact flags from the last physics step.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ContactFlags {
    pub left: bool,
    pub right: bool,
    pub down: bool,
    pub up: bool,
}

impl ContactFlags {
    /// Touching exactly one side wall.
    pub fn one_wall(self) -> bool {
        self.left != self.right
    }

    pub fn any_wall(self) -> bool {
        self.left || self.right
    }
}

#[derive(Clone, Debug)]
pub struct Body {
    pub kind: EntityKind,
    /// Top-left corner, world pixels.
    pub pos: Vec2,
    pub w: f32,
    pub h: f32,
    pub vel: Vec2,
    pub blocked: ContactFlags,
    pub enabled: bool,
    pub gravity: bool,
}

impl Body {
    pub fn new(kind: EntityKind, pos: Vec2, w: f32, h: f32) -> Self {
        Body {
            kind,
            pos,
            w,
            h,
            vel: Vec2::ZERO,
            blocked: ContactFlags::default(),
            enabled: true,
            gravity: true,
        }
    }

    pub fn grounded(&self) -> bool {
        self.blocked.down
    }

    pub fn center_x(&self) -> f32 {
        self.pos.x + self.w * 0.5
    }

    pub fn bottom(&self) -> f32 {
        self.pos.y + self.h
    }

    pub fn right(&self) -> f32 {
        self.pos.x + self.w
    }

    pub fn overlaps(&self, other: &Body) -> bool {
        self.pos.x < other.right()
            && self.right() > other.pos.x
            && self.pos.y < other.bottom()
            && self.bottom() > other.pos.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_strict() {
        let a = Body::new(EntityKind::Player, Vec2::new(0.0, 0.0), 10.0, 10.0);
        let mut b = Body::new(EntityKind::Enemy, Vec2::new(10.0, 0.0), 10.0, 10.0);
        // Touching edges do not overlap
        assert!(!a.overlaps(&b));
        b.pos.x = 9.5;
        assert!(a.overlaps(&b));
    }

    #[test]
    fn one_wall_is_exclusive() {
        let both = ContactFlags { left: true, right: true, ..Default::default() };
        assert!(both.any_wall());
        assert!(!both.one_wall());
        let left = ContactFlags { left: true, ..Default::default() };
        assert!(left.one_wall());
    }
}
