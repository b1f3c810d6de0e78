//! Persistence port for calendar sync.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CalendarError, queries};
use crate::models::board::{BoardKind, BoardRole};
use crate::models::calendar::{
    CalendarLink, StoredCredential, SyncCounts, SyncPlan, SyncedItem,
};

/// Board and item storage used by the sync service.
///
/// Mutations on a board that does not exist fail with `BoardNotFound`.
#[async_trait]
pub trait BoardStore: Send + Sync {
    /// `None` when the board does not exist.
    async fn board_kind(&self, board_id: Uuid) -> Result<Option<BoardKind>, CalendarError>;

    async fn board_role(
        &self,
        board_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BoardRole>, CalendarError>;

    async fn calendar_credential(
        &self,
        board_id: Uuid,
    ) -> Result<Option<StoredCredential>, CalendarError>;

    async fn calendar_link(&self, board_id: Uuid) -> Result<Option<CalendarLink>, CalendarError>;

    /// The configured window, which exists even before a calendar is selected.
    async fn sync_range_days(&self, board_id: Uuid) -> Result<Option<i32>, CalendarError>;

    /// Live items carrying an external event back-reference.
    async fn list_synced_items(&self, board_id: Uuid) -> Result<Vec<SyncedItem>, CalendarError>;

    /// Apply every create, update, and delete of `plan`, or none of them.
    async fn apply_sync_plan(
        &self,
        board_id: Uuid,
        plan: &SyncPlan,
    ) -> Result<SyncCounts, CalendarError>;

    async fn persist_refreshed_token(
        &self,
        board_id: Uuid,
        access_token_encrypted: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CalendarError>;

    async fn persist_last_sync_at(
        &self,
        board_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), CalendarError>;

    async fn persist_sync_range(&self, board_id: Uuid, days: i32) -> Result<(), CalendarError>;

    async fn store_credential(
        &self,
        board_id: Uuid,
        credential: &StoredCredential,
        connected_by: Uuid,
    ) -> Result<(), CalendarError>;

    async fn select_calendar(
        &self,
        board_id: Uuid,
        calendar_id: &str,
        calendar_name: Option<&str>,
    ) -> Result<(), CalendarError>;

    /// Remove the credential and calendar link together.
    async fn clear_calendar(&self, board_id: Uuid) -> Result<(), CalendarError>;
}

/// PostgreSQL-backed [`BoardStore`].
#[derive(Debug, Clone)]
pub struct PgBoardStore {
    pool: PgPool,
}

impl PgBoardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BoardStore for PgBoardStore {
    async fn board_kind(&self, board_id: Uuid) -> Result<Option<BoardKind>, CalendarError> {
        Ok(queries::get_board_calendar(&self.pool, board_id)
            .await?
            .map(|row| row.board_type))
    }

    async fn board_role(
        &self,
        board_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BoardRole>, CalendarError> {
        queries::get_board_role(&self.pool, board_id, user_id).await
    }

    async fn calendar_credential(
        &self,
        board_id: Uuid,
    ) -> Result<Option<StoredCredential>, CalendarError> {
        Ok(queries::get_board_calendar(&self.pool, board_id)
            .await?
            .and_then(|row| row.credential()))
    }

    async fn calendar_link(&self, board_id: Uuid) -> Result<Option<CalendarLink>, CalendarError> {
        Ok(queries::get_board_calendar(&self.pool, board_id)
            .await?
            .and_then(|row| row.link()))
    }

    async fn sync_range_days(&self, board_id: Uuid) -> Result<Option<i32>, CalendarError> {
        Ok(queries::get_board_calendar(&self.pool, board_id)
            .await?
            .map(|row| row.calendar_sync_range_days))
    }

    async fn list_synced_items(&self, board_id: Uuid) -> Result<Vec<SyncedItem>, CalendarError> {
        let rows = queries::list_synced_items(&self.pool, board_id).await?;
        Ok(rows.into_iter().map(SyncedItem::from).collect())
    }

    async fn apply_sync_plan(
        &self,
        board_id: Uuid,
        plan: &SyncPlan,
    ) -> Result<SyncCounts, CalendarError> {
        queries::apply_sync_plan(&self.pool, board_id, plan).await
    }

    async fn persist_refreshed_token(
        &self,
        board_id: Uuid,
        access_token_encrypted: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CalendarError> {
        queries::update_access_token(&self.pool, board_id, access_token_encrypted, expires_at).await
    }

    async fn persist_last_sync_at(
        &self,
        board_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), CalendarError> {
        queries::update_last_sync_at(&self.pool, board_id, at).await
    }

    async fn persist_sync_range(&self, board_id: Uuid, days: i32) -> Result<(), CalendarError> {
        queries::update_sync_range(&self.pool, board_id, days).await
    }

    async fn store_credential(
        &self,
        board_id: Uuid,
        credential: &StoredCredential,
        connected_by: Uuid,
    ) -> Result<(), CalendarError> {
        queries::store_credential(&self.pool, board_id, credential, connected_by).await
    }

    async fn select_calendar(
        &self,
        board_id: Uuid,
        calendar_id: &str,
        calendar_name: Option<&str>,
    ) -> Result<(), CalendarError> {
        queries::select_calendar(&self.pool, board_id, calendar_id, calendar_name).await
    }

    async fn clear_calendar(&self, board_id: Uuid) -> Result<(), CalendarError> {
        queries::clear_calendar(&self.pool, board_id).await
    }
}
