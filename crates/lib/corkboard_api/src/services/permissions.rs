//! Board membership checks for calendar routes.

use corkboard_core::models::board::BoardRole;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};

/// What a route needs to do with a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAccess {
    /// Any member.
    Read,
    /// Owners and editors.
    Manage,
}

/// Check `user_id`'s membership on `board_id`.
///
/// Non-members get the same 404 as a missing board.
pub async fn require_board_access(
    state: &AppState,
    board_id: Uuid,
    user_id: Uuid,
    access: BoardAccess,
) -> AppResult<BoardRole> {
    let role = state
        .sync
        .board_role(board_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Board not found or no permission".into()))?;

    if access == BoardAccess::Manage && !role.can_manage() {
        return Err(AppError::Forbidden(
            "Only board owners and editors can manage the calendar".into(),
        ));
    }
    Ok(role)
}
