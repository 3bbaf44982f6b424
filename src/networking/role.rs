//! Who we are playing and which side we hold
//!
//! The vs-computer and vs-friend screens differ only in how the game is set
//! up and what is shown while waiting. Everything after the socket opens is
//! the same sync engine; [`RolePolicy`] carries the difference.

use crate::game::types::{color_name, Color};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleKind {
    VsComputer { level: u8 },
    VsFriend { invitation_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    pub kind: RoleKind,
    pub local_color: Color,
}

impl RolePolicy {
    pub fn vs_computer(level: u8, local_color: Color) -> Self {
        Self {
            kind: RoleKind::VsComputer { level },
            local_color,
        }
    }

    pub fn vs_friend(invitation_id: impl Into<String>, local_color: Color) -> Self {
        Self {
            kind: RoleKind::VsFriend {
                invitation_id: invitation_id.into(),
            },
            local_color,
        }
    }

    /// Whether `color` is the side this client moves
    pub fn is_local(&self, color: Color) -> bool {
        self.local_color == color
    }

    /// Invitation link to share with a friend, if this is a friend game
    pub fn invitation_link(&self, scheme: &str) -> Option<String> {
        match &self.kind {
            RoleKind::VsFriend { invitation_id } => Some(format!("{scheme}://{invitation_id}")),
            RoleKind::VsComputer { .. } => None,
        }
    }

    /// One-line description for the status area
    pub fn describe(&self) -> String {
        match &self.kind {
            RoleKind::VsComputer { level } => format!(
                "Playing {} against the computer (level {})",
                color_name(self.local_color),
                level
            ),
            RoleKind::VsFriend { invitation_id } => format!(
                "Playing {} against a friend (game {})",
                color_name(self.local_color),
                invitation_id
            ),
        }
    }
}
