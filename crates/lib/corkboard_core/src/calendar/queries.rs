//! Calendar sync database queries.
//!
//! Raw SQLx queries over the calendar columns of `boards` and the
//! calendar-owned rows of `items`.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::CalendarError;
use crate::models::board::BoardRole;
use crate::models::calendar::{
    BoardCalendarRow, ItemDraft, StoredCredential, SyncCounts, SyncPlan, SyncedItemRow,
};

fn require_row(rows_affected: u64) -> Result<(), CalendarError> {
    if rows_affected == 0 {
        return Err(CalendarError::BoardNotFound);
    }
    Ok(())
}

// =============================================================================
// Board queries
// =============================================================================

/// Calendar columns of one board.
pub async fn get_board_calendar(
    pool: &PgPool,
    board_id: Uuid,
) -> Result<Option<BoardCalendarRow>, CalendarError> {
    let row = sqlx::query_as::<_, BoardCalendarRow>(
        r#"
        SELECT board_type,
               google_calendar_id, google_calendar_name,
               google_access_token, google_refresh_token, google_token_expires_at,
               calendar_sync_range_days, calendar_last_sync_at, calendar_connected_by
        FROM boards
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// A user's role on a board, if they are a member.
pub async fn get_board_role(
    pool: &PgPool,
    board_id: Uuid,
    user_id: Uuid,
) -> Result<Option<BoardRole>, CalendarError> {
    let role = sqlx::query_scalar::<_, BoardRole>(
        "SELECT role FROM user_boards WHERE board_id = $1 AND user_id = $2",
    )
    .bind(board_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(role)
}

/// Store freshly authorized tokens and who connected them.
pub async fn store_credential(
    pool: &PgPool,
    board_id: Uuid,
    credential: &StoredCredential,
    connected_by: Uuid,
) -> Result<(), CalendarError> {
    let result = sqlx::query(
        r#"
        UPDATE boards
        SET google_access_token = $2,
            google_refresh_token = $3,
            google_token_expires_at = $4,
            calendar_connected_by = $5,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .bind(&credential.access_token_encrypted)
    .bind(&credential.refresh_token_encrypted)
    .bind(credential.expires_at)
    .bind(connected_by)
    .execute(pool)
    .await?;
    require_row(result.rows_affected())
}

/// Replace the access token after a refresh. The refresh token is unchanged.
pub async fn update_access_token(
    pool: &PgPool,
    board_id: Uuid,
    access_token_encrypted: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), CalendarError> {
    let result = sqlx::query(
        r#"
        UPDATE boards
        SET google_access_token = $2,
            google_token_expires_at = $3,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .bind(access_token_encrypted)
    .bind(expires_at)
    .execute(pool)
    .await?;
    require_row(result.rows_affected())
}

pub async fn update_last_sync_at(
    pool: &PgPool,
    board_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), CalendarError> {
    let result = sqlx::query("UPDATE boards SET calendar_last_sync_at = $2 WHERE id = $1")
        .bind(board_id)
        .bind(at)
        .execute(pool)
        .await?;
    require_row(result.rows_affected())
}

pub async fn update_sync_range(
    pool: &PgPool,
    board_id: Uuid,
    days: i32,
) -> Result<(), CalendarError> {
    let result = sqlx::query(
        "UPDATE boards SET calendar_sync_range_days = $2, updated_at = now() WHERE id = $1",
    )
    .bind(board_id)
    .bind(days)
    .execute(pool)
    .await?;
    require_row(result.rows_affected())
}

pub async fn select_calendar(
    pool: &PgPool,
    board_id: Uuid,
    calendar_id: &str,
    calendar_name: Option<&str>,
) -> Result<(), CalendarError> {
    let result = sqlx::query(
        r#"
        UPDATE boards
        SET google_calendar_id = $2,
            google_calendar_name = $3,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .bind(calendar_id)
    .bind(calendar_name)
    .execute(pool)
    .await?;
    require_row(result.rows_affected())
}

/// Clear the credential and calendar link in one statement.
pub async fn clear_calendar(pool: &PgPool, board_id: Uuid) -> Result<(), CalendarError> {
    let result = sqlx::query(
        r#"
        UPDATE boards
        SET google_calendar_id = NULL,
            google_calendar_name = NULL,
            google_access_token = NULL,
            google_refresh_token = NULL,
            google_token_expires_at = NULL,
            calendar_last_sync_at = NULL,
            calendar_connected_by = NULL,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .execute(pool)
    .await?;
    require_row(result.rows_affected())
}

// =============================================================================
// Item queries
// =============================================================================

/// Live calendar-owned items of a board.
pub async fn list_synced_items(
    pool: &PgPool,
    board_id: Uuid,
) -> Result<Vec<SyncedItemRow>, CalendarError> {
    let rows = sqlx::query_as::<_, SyncedItemRow>(
        r#"
        SELECT id, board_id, name, details, category, is_checked,
               google_event_id, event_start_time, event_end_time,
               event_description, google_calendar_link
        FROM items
        WHERE board_id = $1
          AND google_event_id IS NOT NULL
          AND deleted_at IS NULL
        ORDER BY event_start_time, id
        "#,
    )
    .bind(board_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn insert_item(conn: &mut PgConnection, draft: &ItemDraft) -> Result<Uuid, CalendarError> {
    let id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO items (
            id, board_id, name, details, category, is_checked,
            google_event_id, event_start_time, event_end_time,
            event_description, google_calendar_link
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(id)
    .bind(draft.board_id)
    .bind(&draft.name)
    .bind(&draft.details)
    .bind(&draft.category)
    .bind(draft.is_checked)
    .bind(&draft.external.event_id)
    .bind(draft.external.start)
    .bind(draft.external.end)
    .bind(&draft.external.description)
    .bind(&draft.external.link)
    .execute(conn)
    .await?;
    Ok(id)
}

/// Overwrite the sync-owned fields of one item.
pub async fn update_item(
    conn: &mut PgConnection,
    item_id: Uuid,
    draft: &ItemDraft,
) -> Result<u64, CalendarError> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET name = $3,
            event_start_time = $4,
            event_end_time = $5,
            event_description = $6,
            google_calendar_link = $7,
            updated_at = now()
        WHERE id = $1 AND board_id = $2
        "#,
    )
    .bind(item_id)
    .bind(draft.board_id)
    .bind(&draft.name)
    .bind(draft.external.start)
    .bind(draft.external.end)
    .bind(&draft.external.description)
    .bind(&draft.external.link)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_items_by_ids(
    conn: &mut PgConnection,
    board_id: Uuid,
    ids: &[Uuid],
) -> Result<u64, CalendarError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("DELETE FROM items WHERE board_id = $1 AND id = ANY($2)")
        .bind(board_id)
        .bind(ids)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Apply a sync plan in one transaction: creates, then updates, then one batch delete.
pub async fn apply_sync_plan(
    pool: &PgPool,
    board_id: Uuid,
    plan: &SyncPlan,
) -> Result<SyncCounts, CalendarError> {
    let mut tx = pool.begin().await?;
    let mut counts = SyncCounts::default();

    for draft in &plan.to_create {
        insert_item(&mut *tx, draft).await?;
        counts.created += 1;
    }

    for update in &plan.to_update {
        let affected = update_item(&mut *tx, update.existing.id, &update.draft).await?;
        counts.updated += affected as usize;
    }

    let ids: Vec<Uuid> = plan.to_delete.iter().map(|item| item.id).collect();
    counts.deleted = delete_items_by_ids(&mut *tx, board_id, &ids).await? as usize;

    tx.commit().await?;
    Ok(counts)
}
