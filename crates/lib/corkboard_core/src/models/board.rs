//! Board and membership models.

use serde::{Deserialize, Serialize};

/// Kind of board. Only `Events` boards can be linked to a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "board_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardKind {
    Checklist,
    NoticeBoard,
    Events,
}

/// A user's role on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "board_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BoardRole {
    Owner,
    Editor,
    Viewer,
}

impl BoardRole {
    /// Whether this role may connect, configure, sync, or disconnect a calendar.
    pub fn can_manage(self) -> bool {
        matches!(self, BoardRole::Owner | BoardRole::Editor)
    }
}
