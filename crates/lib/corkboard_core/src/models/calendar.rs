//! Calendar sync domain models.
//!
//! Credentials and links are stored as nullable columns on `boards`;
//! calendar-owned items carry an external event back-reference on `items`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::board::BoardKind;

/// Category given to every item created from a calendar event.
pub const DEFAULT_EVENT_CATEGORY: &str = "Event";

/// Smallest allowed forward sync window, in days.
pub const MIN_SYNC_RANGE_DAYS: i32 = 1;

/// Largest allowed forward sync window, in days.
pub const MAX_SYNC_RANGE_DAYS: i32 = 365;

/// Forward sync window used until a board owner picks one.
pub const DEFAULT_SYNC_RANGE_DAYS: i32 = 14;

// =============================================================================
// Credentials
// =============================================================================

/// OAuth material exactly as persisted (tokens encrypted).
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Decrypted OAuth material for one board.
#[derive(Clone)]
pub struct CalendarCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for CalendarCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarCredential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens returned by a completed OAuth authorization-code exchange.
#[derive(Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Calendar link and provider data
// =============================================================================

/// The calendar a board is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarLink {
    pub calendar_id: String,
    pub calendar_name: Option<String>,
    pub sync_range_days: i32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub connected_by: Option<Uuid>,
}

/// A calendar the connected account can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_primary: bool,
}

/// One event occurrence read from the provider during a single sync pass.
///
/// All-day events are anchored at UTC midnight of their calendar dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub html_link: String,
    pub is_all_day: bool,
}

// =============================================================================
// Items
// =============================================================================

/// Back-reference from an item to the event it mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEventRef {
    pub event_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    pub link: String,
}

impl ExternalEventRef {
    /// Build the stored back-reference for an event. Empty descriptions are stored as `None`.
    pub fn from_event(event: &ExternalEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            start: event.start,
            end: event.end,
            description: event.description.clone().filter(|d| !d.is_empty()),
            link: event.html_link.clone(),
        }
    }
}

/// A live (not soft-deleted) calendar-owned board item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedItem {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub details: Option<String>,
    pub category: Option<String>,
    pub is_checked: bool,
    pub external: ExternalEventRef,
}

/// Fields for an item derived from an external event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub board_id: Uuid,
    pub name: String,
    pub details: Option<String>,
    pub category: String,
    pub is_checked: bool,
    pub external: ExternalEventRef,
}

/// An existing item paired with the fields derived from its event this pass.
///
/// Applying an update writes only the sync-owned fields (name and the
/// back-reference); details, category, and the checked flag stay as the
/// board's users left them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
    pub existing: SyncedItem,
    pub draft: ItemDraft,
}

/// The create/update/delete sets produced by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_create: Vec<ItemDraft>,
    pub to_update: Vec<ItemUpdate>,
    pub to_delete: Vec<SyncedItem>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Counts the plan would produce if applied in full.
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            created: self.to_create.len(),
            updated: self.to_update.len(),
            deleted: self.to_delete.len(),
        }
    }
}

// =============================================================================
// Results and status
// =============================================================================

/// Items written by one applied sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Outcome of one `sync_board` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub items_created: usize,
    pub items_updated: usize,
    pub items_deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn completed(counts: SyncCounts) -> Self {
        Self {
            success: true,
            items_created: counts.created,
            items_updated: counts.updated,
            items_deleted: counts.deleted,
            error: None,
        }
    }

    pub fn failed(counts: SyncCounts, error: impl Into<String>) -> Self {
        Self {
            success: false,
            items_created: counts.created,
            items_updated: counts.updated,
            items_deleted: counts.deleted,
            error: Some(error.into()),
        }
    }

    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            created: self.items_created,
            updated: self.items_updated,
            deleted: self.items_deleted,
        }
    }
}

/// Read-only view of a board's calendar connection. Never carries tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_connected: bool,
    pub has_credentials: bool,
    pub calendar_id: Option<String>,
    pub calendar_name: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_range_days: i32,
    pub connected_by: Option<Uuid>,
}

// =============================================================================
// DB row structs
// =============================================================================

/// Calendar columns of a `boards` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BoardCalendarRow {
    pub board_type: BoardKind,
    pub google_calendar_id: Option<String>,
    pub google_calendar_name: Option<String>,
    pub google_access_token: Option<String>,
    pub google_refresh_token: Option<String>,
    pub google_token_expires_at: Option<DateTime<Utc>>,
    pub calendar_sync_range_days: i32,
    pub calendar_last_sync_at: Option<DateTime<Utc>>,
    pub calendar_connected_by: Option<Uuid>,
}

impl BoardCalendarRow {
    /// The stored credential, if every part of it is present.
    pub fn credential(&self) -> Option<StoredCredential> {
        match (
            &self.google_access_token,
            &self.google_refresh_token,
            self.google_token_expires_at,
        ) {
            (Some(access), Some(refresh), Some(expires_at))
                if !access.is_empty() && !refresh.is_empty() =>
            {
                Some(StoredCredential {
                    access_token_encrypted: access.clone(),
                    refresh_token_encrypted: refresh.clone(),
                    expires_at,
                })
            }
            _ => None,
        }
    }

    /// The calendar link, if a calendar has been selected.
    pub fn link(&self) -> Option<CalendarLink> {
        let calendar_id = self.google_calendar_id.clone().filter(|id| !id.is_empty())?;
        Some(CalendarLink {
            calendar_id,
            calendar_name: self.google_calendar_name.clone(),
            sync_range_days: self.calendar_sync_range_days,
            last_sync_at: self.calendar_last_sync_at,
            connected_by: self.calendar_connected_by,
        })
    }
}

/// Database row for a calendar-owned `items` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncedItemRow {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub details: Option<String>,
    pub category: Option<String>,
    pub is_checked: bool,
    pub google_event_id: String,
    pub event_start_time: Option<DateTime<Utc>>,
    pub event_end_time: Option<DateTime<Utc>>,
    pub event_description: Option<String>,
    pub google_calendar_link: Option<String>,
}

impl From<SyncedItemRow> for SyncedItem {
    /// Missing timing columns read as the epoch so the next sync rewrites them.
    fn from(row: SyncedItemRow) -> Self {
        Self {
            id: row.id,
            board_id: row.board_id,
            name: row.name,
            details: row.details,
            category: row.category,
            is_checked: row.is_checked,
            external: ExternalEventRef {
                event_id: row.google_event_id,
                start: row.event_start_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                end: row.event_end_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                description: row.event_description,
                link: row.google_calendar_link.unwrap_or_default(),
            },
        }
    }
}
