//! Movement input.
//!
//! Windowing and key repeat belong to the host application. This module only
//! turns held movement keys into the `Move` direction the server expects.

use wildlands_shared::{math::Vec3, protocol::ClientMessage};

/// Movement keys held at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveKeys {
    /// Unit-step direction. `back` overrides `forward` and `right` overrides
    /// `left` when both are held.
    pub fn direction(self) -> Vec3 {
        let mut dir = Vec3::ZERO;
        if self.forward {
            dir.z = 1.0;
        }
        if self.back {
            dir.z = -1.0;
        }
        if self.left {
            dir.x = 1.0;
        }
        if self.right {
            dir.x = -1.0;
        }
        dir
    }

    /// Applies a `w`/`a`/`s`/`d` key press or release. Other keys are ignored.
    pub fn set_key(&mut self, key: char, pressed: bool) {
        match key {
            'w' => self.forward = pressed,
            's' => self.back = pressed,
            'a' => self.left = pressed,
            'd' => self.right = pressed,
            _ => {}
        }
    }
}

/// Turns held keys into a `Move` message.
pub fn build_move(keys: MoveKeys) -> ClientMessage {
    ClientMessage::Move {
        direction: keys.direction(),
    }
}
