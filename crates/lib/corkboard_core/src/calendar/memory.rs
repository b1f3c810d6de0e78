//! In-memory [`BoardStore`] for tests and local runs without PostgreSQL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::CalendarError;
use super::store::BoardStore;
use crate::models::board::{BoardKind, BoardRole};
use crate::models::calendar::{
    CalendarLink, DEFAULT_SYNC_RANGE_DAYS, ExternalEventRef, StoredCredential, SyncCounts,
    SyncPlan, SyncedItem,
};

#[derive(Debug, Clone)]
struct BoardRecord {
    kind: BoardKind,
    members: HashMap<Uuid, BoardRole>,
    calendar_id: Option<String>,
    calendar_name: Option<String>,
    credential: Option<StoredCredential>,
    sync_range_days: i32,
    last_sync_at: Option<DateTime<Utc>>,
    connected_by: Option<Uuid>,
}

/// An item as held by the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub details: Option<String>,
    pub category: Option<String>,
    pub is_checked: bool,
    pub external: Option<ExternalEventRef>,
}

impl StoredItem {
    fn as_synced(&self) -> Option<SyncedItem> {
        let external = self.external.clone()?;
        Some(SyncedItem {
            id: self.id,
            board_id: self.board_id,
            name: self.name.clone(),
            details: self.details.clone(),
            category: self.category.clone(),
            is_checked: self.is_checked,
            external,
        })
    }
}

#[derive(Debug, Default)]
struct State {
    boards: HashMap<Uuid, BoardRecord>,
    items: Vec<StoredItem>,
}

impl State {
    fn board_mut(&mut self, board_id: Uuid) -> Result<&mut BoardRecord, CalendarError> {
        self.boards
            .get_mut(&board_id)
            .ok_or(CalendarError::BoardNotFound)
    }
}

/// Mutex-guarded board and item tables.
#[derive(Debug, Default)]
pub struct InMemoryBoardStore {
    state: Mutex<State>,
    fail_next_apply: AtomicBool,
}

impl InMemoryBoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a board with no calendar connection.
    pub fn add_board(&self, kind: BoardKind) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().boards.insert(
            id,
            BoardRecord {
                kind,
                members: HashMap::new(),
                calendar_id: None,
                calendar_name: None,
                credential: None,
                sync_range_days: DEFAULT_SYNC_RANGE_DAYS,
                last_sync_at: None,
                connected_by: None,
            },
        );
        id
    }

    pub fn add_member(&self, board_id: Uuid, user_id: Uuid, role: BoardRole) {
        if let Some(board) = self.lock().boards.get_mut(&board_id) {
            board.members.insert(user_id, role);
        }
    }

    /// Add a user-created item with no external event.
    pub fn add_item(&self, board_id: Uuid, name: &str) -> Uuid {
        self.push_item(board_id, name, None)
    }

    /// Add an item as a previous sync would have left it.
    pub fn add_synced_item(&self, board_id: Uuid, name: &str, external: ExternalEventRef) -> Uuid {
        self.push_item(board_id, name, Some(external))
    }

    fn push_item(&self, board_id: Uuid, name: &str, external: Option<ExternalEventRef>) -> Uuid {
        let id = Uuid::now_v7();
        self.lock().items.push(StoredItem {
            id,
            board_id,
            name: name.to_string(),
            details: None,
            category: None,
            is_checked: false,
            external,
        });
        id
    }

    /// Every item on a board, calendar-owned or not.
    pub fn items(&self, board_id: Uuid) -> Vec<StoredItem> {
        self.lock()
            .items
            .iter()
            .filter(|i| i.board_id == board_id)
            .cloned()
            .collect()
    }

    pub fn last_sync_at(&self, board_id: Uuid) -> Option<DateTime<Utc>> {
        self.lock().boards.get(&board_id)?.last_sync_at
    }

    /// Make the next `apply_sync_plan` fail without changing anything.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BoardStore for InMemoryBoardStore {
    async fn board_kind(&self, board_id: Uuid) -> Result<Option<BoardKind>, CalendarError> {
        Ok(self.lock().boards.get(&board_id).map(|b| b.kind))
    }

    async fn board_role(
        &self,
        board_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BoardRole>, CalendarError> {
        Ok(self
            .lock()
            .boards
            .get(&board_id)
            .and_then(|b| b.members.get(&user_id).copied()))
    }

    async fn calendar_credential(
        &self,
        board_id: Uuid,
    ) -> Result<Option<StoredCredential>, CalendarError> {
        Ok(self
            .lock()
            .boards
            .get(&board_id)
            .and_then(|b| b.credential.clone()))
    }

    async fn calendar_link(&self, board_id: Uuid) -> Result<Option<CalendarLink>, CalendarError> {
        let state = self.lock();
        let Some(board) = state.boards.get(&board_id) else {
            return Ok(None);
        };
        Ok(board.calendar_id.clone().map(|calendar_id| CalendarLink {
            calendar_id,
            calendar_name: board.calendar_name.clone(),
            sync_range_days: board.sync_range_days,
            last_sync_at: board.last_sync_at,
            connected_by: board.connected_by,
        }))
    }

    async fn sync_range_days(&self, board_id: Uuid) -> Result<Option<i32>, CalendarError> {
        Ok(self.lock().boards.get(&board_id).map(|b| b.sync_range_days))
    }

    async fn list_synced_items(&self, board_id: Uuid) -> Result<Vec<SyncedItem>, CalendarError> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.board_id == board_id)
            .filter_map(StoredItem::as_synced)
            .collect())
    }

    async fn apply_sync_plan(
        &self,
        board_id: Uuid,
        plan: &SyncPlan,
    ) -> Result<SyncCounts, CalendarError> {
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(CalendarError::Persistence("injected apply failure".into()));
        }

        let mut state = self.lock();
        if !state.boards.contains_key(&board_id) {
            return Err(CalendarError::BoardNotFound);
        }

        // Work on a copy so a failure leaves the table untouched.
        let mut items = state.items.clone();
        let mut counts = SyncCounts::default();

        for draft in &plan.to_create {
            let taken = items.iter().any(|i| {
                i.board_id == board_id
                    && i.external
                        .as_ref()
                        .is_some_and(|e| e.event_id == draft.external.event_id)
            });
            if taken {
                return Err(CalendarError::Persistence(format!(
                    "duplicate external event id {}",
                    draft.external.event_id
                )));
            }
            items.push(StoredItem {
                id: Uuid::now_v7(),
                board_id,
                name: draft.name.clone(),
                details: draft.details.clone(),
                category: Some(draft.category.clone()),
                is_checked: draft.is_checked,
                external: Some(draft.external.clone()),
            });
            counts.created += 1;
        }

        for update in &plan.to_update {
            if let Some(item) = items
                .iter_mut()
                .find(|i| i.id == update.existing.id && i.board_id == board_id)
            {
                item.name = update.draft.name.clone();
                item.external = Some(update.draft.external.clone());
                counts.updated += 1;
            }
        }

        let before = items.len();
        items.retain(|i| {
            !(i.board_id == board_id && plan.to_delete.iter().any(|d| d.id == i.id))
        });
        counts.deleted = before - items.len();

        state.items = items;
        Ok(counts)
    }

    async fn persist_refreshed_token(
        &self,
        board_id: Uuid,
        access_token_encrypted: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CalendarError> {
        let mut state = self.lock();
        let board = state.board_mut(board_id)?;
        let credential = board.credential.as_mut().ok_or(CalendarError::NotConfigured)?;
        credential.access_token_encrypted = access_token_encrypted.to_string();
        credential.expires_at = expires_at;
        Ok(())
    }

    async fn persist_last_sync_at(
        &self,
        board_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), CalendarError> {
        self.lock().board_mut(board_id)?.last_sync_at = Some(at);
        Ok(())
    }

    async fn persist_sync_range(&self, board_id: Uuid, days: i32) -> Result<(), CalendarError> {
        self.lock().board_mut(board_id)?.sync_range_days = days;
        Ok(())
    }

    async fn store_credential(
        &self,
        board_id: Uuid,
        credential: &StoredCredential,
        connected_by: Uuid,
    ) -> Result<(), CalendarError> {
        let mut state = self.lock();
        let board = state.board_mut(board_id)?;
        board.credential = Some(credential.clone());
        board.connected_by = Some(connected_by);
        Ok(())
    }

    async fn select_calendar(
        &self,
        board_id: Uuid,
        calendar_id: &str,
        calendar_name: Option<&str>,
    ) -> Result<(), CalendarError> {
        let mut state = self.lock();
        let board = state.board_mut(board_id)?;
        board.calendar_id = Some(calendar_id.to_string());
        board.calendar_name = calendar_name.map(str::to_string);
        Ok(())
    }

    async fn clear_calendar(&self, board_id: Uuid) -> Result<(), CalendarError> {
        let mut state = self.lock();
        let board = state.board_mut(board_id)?;
        board.calendar_id = None;
        board.calendar_name = None;
        board.credential = None;
        board.last_sync_at = None;
        board.connected_by = None;
        Ok(())
    }
}
