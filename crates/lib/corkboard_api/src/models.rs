//! Request and response bodies.

use corkboard_core::models::calendar::{CalendarSummary, SyncResult};
use serde::{Deserialize, Serialize};

/// Error body for every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListResponse {
    pub calendars: Vec<CalendarSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectCalendarRequest {
    pub calendar_id: String,
    pub calendar_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSyncRangeRequest {
    pub days: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSyncRangeResponse {
    pub success: bool,
    pub sync_range_days: i32,
}

/// Outcome of a manual sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBoardResponse {
    pub success: bool,
    pub message: String,
    pub items_created: usize,
    pub items_updated: usize,
    pub items_deleted: usize,
}

impl From<SyncResult> for SyncBoardResponse {
    fn from(result: SyncResult) -> Self {
        Self {
            success: result.success,
            message: result
                .error
                .unwrap_or_else(|| "Calendar synced successfully".to_string()),
            items_created: result.items_created,
            items_updated: result.items_updated,
            items_deleted: result.items_deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub auth_url: String,
}

/// Query string Google appends to the OAuth redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
