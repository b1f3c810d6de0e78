//! Board calendar request handlers.

use axum::Json;
use axum::extract::{Path, State};
use corkboard_core::models::calendar::SyncStatus;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CalendarListResponse, SelectCalendarRequest, SuccessResponse, SyncBoardResponse,
    UpdateSyncRangeRequest, UpdateSyncRangeResponse,
};
use crate::services::permissions::{BoardAccess, require_board_access};

/// `GET /api/boards/{board_id}/calendar`: connection status.
pub async fn sync_status_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(board_id): Path<Uuid>,
) -> AppResult<Json<SyncStatus>> {
    require_board_access(&state, board_id, user.user_id, BoardAccess::Read).await?;
    let status = state
        .sync
        .get_sync_status(board_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Board not found".into()))?;
    Ok(Json(status))
}

/// `GET /api/boards/{board_id}/calendar/calendars`: calendars the connected account can read.
pub async fn list_calendars_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(board_id): Path<Uuid>,
) -> AppResult<Json<CalendarListResponse>> {
    require_board_access(&state, board_id, user.user_id, BoardAccess::Manage).await?;
    let calendars = state.sync.available_calendars(board_id).await?;
    Ok(Json(CalendarListResponse { calendars }))
}

/// `PUT /api/boards/{board_id}/calendar/selection`: link a calendar.
pub async fn select_calendar_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(board_id): Path<Uuid>,
    Json(body): Json<SelectCalendarRequest>,
) -> AppResult<Json<SuccessResponse>> {
    require_board_access(&state, board_id, user.user_id, BoardAccess::Manage).await?;

    let calendar_id = body.calendar_id.trim();
    if calendar_id.is_empty() {
        return Err(AppError::Validation("calendarId is required".into()));
    }
    let calendar_name = body
        .calendar_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    state
        .sync
        .select_calendar(board_id, calendar_id, calendar_name)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// `POST /api/boards/{board_id}/calendar/sync`: sync now.
///
/// Sync failures are reported in the body with `success: false`, not as an HTTP error.
pub async fn sync_board_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(board_id): Path<Uuid>,
) -> AppResult<Json<SyncBoardResponse>> {
    let user_id = user.user_id;
    require_board_access(&state, board_id, user_id, BoardAccess::Manage).await?;
    info!(%board_id, %user_id, "manual calendar sync requested");
    let result = state.sync.sync_board(board_id).await;
    Ok(Json(SyncBoardResponse::from(result)))
}

/// `PUT /api/boards/{board_id}/calendar/range`: days ahead to sync.
pub async fn update_sync_range_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(board_id): Path<Uuid>,
    Json(body): Json<UpdateSyncRangeRequest>,
) -> AppResult<Json<UpdateSyncRangeResponse>> {
    require_board_access(&state, board_id, user.user_id, BoardAccess::Manage).await?;
    state.sync.update_sync_range(board_id, body.days).await?;
    Ok(Json(UpdateSyncRangeResponse {
        success: true,
        sync_range_days: body.days,
    }))
}

/// `DELETE /api/boards/{board_id}/calendar`: disconnect.
pub async fn disconnect_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(board_id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    require_board_access(&state, board_id, user.user_id, BoardAccess::Manage).await?;
    state.sync.disconnect(board_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
