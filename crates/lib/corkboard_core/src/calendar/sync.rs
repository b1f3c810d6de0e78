//! Board calendar sync service.
//!
//! One `sync_board` call loads the board's credential and link, makes sure
//! the access token is usable, fetches the sync window, reconciles it with
//! the board's calendar-owned items, applies the plan, and stamps the sync
//! time. Failures come back as a failed [`SyncResult`], never as an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use dashmap::DashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::TokenCodec;
use super::provider::{CalendarAuthorizer, CalendarProvider, TokenRefresher};
use super::reconcile::reconcile;
use super::store::BoardStore;
use super::CalendarError;
use super::token::{ValidToken, ensure_valid_token};
use crate::models::board::{BoardKind, BoardRole};
use crate::models::calendar::{
    CalendarCredential, CalendarSummary, MAX_SYNC_RANGE_DAYS, MIN_SYNC_RANGE_DAYS, OAuthTokens,
    StoredCredential, SyncCounts, SyncResult, SyncStatus,
};

/// Default bound on each provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

/// Runtime knobs for the sync service.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Bound on each refresh, fetch, and code exchange call.
    pub provider_timeout: Duration,
    /// Zone used to render times in timed event names.
    pub display_tz: Tz,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            display_tz: Tz::UTC,
        }
    }
}

/// Holds a board's in-flight marker until dropped.
struct InFlightGuard<'a> {
    boards: &'a DashSet<Uuid>,
    board_id: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(boards: &'a DashSet<Uuid>, board_id: Uuid) -> Option<Self> {
        boards.insert(board_id).then(|| Self { boards, board_id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.boards.remove(&self.board_id);
    }
}

/// A sync that stopped early, with whatever it had already applied.
struct SyncFailure {
    counts: SyncCounts,
    error: CalendarError,
}

impl From<CalendarError> for SyncFailure {
    fn from(error: CalendarError) -> Self {
        Self {
            counts: SyncCounts::default(),
            error,
        }
    }
}

/// Calendar operations on boards.
pub struct CalendarSyncService {
    store: Arc<dyn BoardStore>,
    provider: Arc<dyn CalendarProvider>,
    refresher: Arc<dyn TokenRefresher>,
    authorizer: Arc<dyn CalendarAuthorizer>,
    codec: TokenCodec,
    settings: SyncSettings,
    in_flight: DashSet<Uuid>,
}

impl CalendarSyncService {
    pub fn new<G>(
        store: Arc<dyn BoardStore>,
        gateway: Arc<G>,
        codec: TokenCodec,
        settings: SyncSettings,
    ) -> Self
    where
        G: CalendarProvider + TokenRefresher + CalendarAuthorizer + 'static,
    {
        Self {
            store,
            provider: gateway.clone(),
            refresher: gateway.clone(),
            authorizer: gateway,
            codec,
            settings,
            in_flight: DashSet::new(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// A user's role on a board, if they are a member.
    pub async fn board_role(
        &self,
        board_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BoardRole>, CalendarError> {
        self.store.board_role(board_id, user_id).await
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Sync one board with its linked calendar.
    pub async fn sync_board(&self, board_id: Uuid) -> SyncResult {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, board_id) else {
            warn!(%board_id, "calendar sync already in progress");
            return SyncResult::failed(
                SyncCounts::default(),
                CalendarError::SyncInProgress(board_id).to_string(),
            );
        };

        match self.run_sync(board_id).await {
            Ok(counts) => {
                info!(
                    %board_id,
                    created = counts.created,
                    updated = counts.updated,
                    deleted = counts.deleted,
                    "calendar sync completed"
                );
                SyncResult::completed(counts)
            }
            Err(SyncFailure { counts, error }) => {
                warn!(%board_id, error = %error, "calendar sync failed");
                SyncResult::failed(counts, error.to_string())
            }
        }
    }

    async fn run_sync(&self, board_id: Uuid) -> Result<SyncCounts, SyncFailure> {
        self.require_events_board(board_id).await?;

        let link = self
            .store
            .calendar_link(board_id)
            .await?
            .ok_or(CalendarError::NotConfigured)?;
        let stored = self
            .store
            .calendar_credential(board_id)
            .await?
            .ok_or(CalendarError::NotConfigured)?;

        let token = self.valid_token(board_id, &stored).await?;

        let events = self
            .bounded(self.provider.list_events(
                &token.access_token,
                &link.calendar_id,
                link.sync_range_days,
            ))
            .await?;

        let existing = self.store.list_synced_items(board_id).await?;
        let plan = reconcile(board_id, &events, existing, &self.settings.display_tz);
        debug!(
            %board_id,
            fetched = events.len(),
            to_create = plan.to_create.len(),
            to_update = plan.to_update.len(),
            to_delete = plan.to_delete.len(),
            "reconciled calendar events"
        );

        let counts = if plan.is_empty() {
            SyncCounts::default()
        } else {
            self.store.apply_sync_plan(board_id, &plan).await?
        };

        self.store
            .persist_last_sync_at(board_id, Utc::now())
            .await
            .map_err(|error| SyncFailure { counts, error })?;

        Ok(counts)
    }

    // =========================================================================
    // Connection state
    // =========================================================================

    /// Connection summary for a board, `None` if the board does not exist.
    pub async fn get_sync_status(&self, board_id: Uuid) -> Result<Option<SyncStatus>, CalendarError> {
        let Some(sync_range_days) = self.store.sync_range_days(board_id).await? else {
            return Ok(None);
        };
        let link = self.store.calendar_link(board_id).await?;
        let has_credentials = self.store.calendar_credential(board_id).await?.is_some();

        Ok(Some(SyncStatus {
            is_connected: has_credentials && link.is_some(),
            has_credentials,
            calendar_id: link.as_ref().map(|l| l.calendar_id.clone()),
            calendar_name: link.as_ref().and_then(|l| l.calendar_name.clone()),
            last_sync_at: link.as_ref().and_then(|l| l.last_sync_at),
            sync_range_days,
            connected_by: link.as_ref().and_then(|l| l.connected_by),
        }))
    }

    /// Set how many days ahead to sync. Out-of-range values are rejected before anything is written.
    pub async fn update_sync_range(&self, board_id: Uuid, days: i32) -> Result<(), CalendarError> {
        if !(MIN_SYNC_RANGE_DAYS..=MAX_SYNC_RANGE_DAYS).contains(&days) {
            return Err(CalendarError::InvalidRange(days));
        }
        self.store.persist_sync_range(board_id, days).await?;
        info!(%board_id, days, "calendar sync range updated");
        Ok(())
    }

    /// Link a board to one of the connected account's calendars.
    pub async fn select_calendar(
        &self,
        board_id: Uuid,
        calendar_id: &str,
        calendar_name: Option<&str>,
    ) -> Result<(), CalendarError> {
        self.require_events_board(board_id).await?;
        if self.store.calendar_credential(board_id).await?.is_none() {
            return Err(CalendarError::NotConfigured);
        }
        self.store
            .select_calendar(board_id, calendar_id, calendar_name)
            .await?;
        info!(%board_id, calendar_id, "calendar selected");
        Ok(())
    }

    /// Drop the credential and calendar link. Synced items stay on the board.
    pub async fn disconnect(&self, board_id: Uuid) -> Result<(), CalendarError> {
        self.store.clear_calendar(board_id).await?;
        info!(%board_id, "calendar disconnected");
        Ok(())
    }

    /// Calendars readable with the board's credential.
    pub async fn available_calendars(
        &self,
        board_id: Uuid,
    ) -> Result<Vec<CalendarSummary>, CalendarError> {
        self.require_events_board(board_id).await?;
        let stored = self
            .store
            .calendar_credential(board_id)
            .await?
            .ok_or(CalendarError::NotConfigured)?;
        let token = self.valid_token(board_id, &stored).await?;
        self.bounded(self.provider.list_calendars(&token.access_token))
            .await
    }

    // =========================================================================
    // OAuth connection
    // =========================================================================

    /// Consent URL for connecting `board_id`, carrying `state`.
    pub async fn authorization_url(
        &self,
        board_id: Uuid,
        state: &str,
    ) -> Result<String, CalendarError> {
        self.require_events_board(board_id).await?;
        self.authorizer.authorization_url(state)
    }

    /// Exchange an authorization code and store the resulting tokens.
    pub async fn complete_connection(
        &self,
        board_id: Uuid,
        code: &str,
        connected_by: Uuid,
    ) -> Result<(), CalendarError> {
        let tokens = self.bounded(self.authorizer.exchange_code(code)).await?;
        self.connect(board_id, &tokens, connected_by).await
    }

    /// Encrypt and store tokens obtained from the provider.
    pub async fn connect(
        &self,
        board_id: Uuid,
        tokens: &OAuthTokens,
        connected_by: Uuid,
    ) -> Result<(), CalendarError> {
        self.require_events_board(board_id).await?;
        let credential = StoredCredential {
            access_token_encrypted: self.codec.encrypt(&tokens.access_token)?,
            refresh_token_encrypted: self.codec.encrypt(&tokens.refresh_token)?,
            expires_at: tokens.expires_at,
        };
        self.store
            .store_credential(board_id, &credential, connected_by)
            .await?;
        info!(%board_id, %connected_by, "calendar credential stored");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_events_board(&self, board_id: Uuid) -> Result<(), CalendarError> {
        match self.store.board_kind(board_id).await? {
            Some(BoardKind::Events) => Ok(()),
            _ => Err(CalendarError::BoardNotFound),
        }
    }

    /// Decrypt, refresh if needed, and persist any refreshed access token.
    async fn valid_token(
        &self,
        board_id: Uuid,
        stored: &StoredCredential,
    ) -> Result<ValidToken, CalendarError> {
        let credential = CalendarCredential {
            access_token: self.codec.decrypt(&stored.access_token_encrypted)?,
            refresh_token: self.codec.decrypt(&stored.refresh_token_encrypted)?,
            expires_at: stored.expires_at,
        };

        let token = ensure_valid_token(
            &credential,
            self.refresher.as_ref(),
            Utc::now(),
            self.settings.provider_timeout,
        )
        .await?;

        if token.was_refreshed {
            let encrypted = self.codec.encrypt(&token.access_token)?;
            self.store
                .persist_refreshed_token(board_id, &encrypted, token.expires_at)
                .await?;
            debug!(%board_id, expires_at = %token.expires_at, "refreshed access token persisted");
        }

        Ok(token)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CalendarError>>,
    ) -> Result<T, CalendarError> {
        tokio::time::timeout(self.settings.provider_timeout, call)
            .await
            .map_err(|_| CalendarError::Provider("calendar request timed out".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::memory::InMemoryBoardStore;
    use crate::calendar::token::RefreshResponse;
    use crate::models::calendar::{ExternalEvent, ExternalEventRef};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, TimeZone};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const KEY: &str = "test-token-key";

    #[derive(Default)]
    struct FakeGateway {
        events: Mutex<Vec<ExternalEvent>>,
        events_error: Mutex<Option<String>>,
        refresh_reply: Mutex<Option<RefreshResponse>>,
        list_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        last_token: Mutex<Option<String>>,
        fetch_delay: Option<Duration>,
        entered: Notify,
        gate: Option<Notify>,
    }

    impl FakeGateway {
        fn with_events(events: Vec<ExternalEvent>) -> Self {
            Self {
                events: Mutex::new(events),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl CalendarProvider for FakeGateway {
        async fn list_calendars(
            &self,
            access_token: &str,
        ) -> Result<Vec<CalendarSummary>, CalendarError> {
            *self.last_token.lock().unwrap() = Some(access_token.to_string());
            Ok(vec![CalendarSummary {
                id: "primary".into(),
                name: "Me".into(),
                description: None,
                is_primary: true,
            }])
        }

        async fn list_events(
            &self,
            access_token: &str,
            _calendar_id: &str,
            _days_forward: i32,
        ) -> Result<Vec<ExternalEvent>, CalendarError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_token.lock().unwrap() = Some(access_token.to_string());
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.fetch_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(msg) = self.events_error.lock().unwrap().clone() {
                return Err(CalendarError::Provider(msg));
            }
            Ok(self.events.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeGateway {
        async fn refresh_access_token(
            &self,
            _refresh_token: &str,
        ) -> Result<RefreshResponse, CalendarError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_reply
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| CalendarError::TokenRefreshFailed("invalid_grant".into()))
        }
    }

    #[async_trait]
    impl CalendarAuthorizer for FakeGateway {
        fn authorization_url(&self, state: &str) -> Result<String, CalendarError> {
            Ok(format!("https://auth.example/consent?state={state}"))
        }

        async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, CalendarError> {
            if code != "good-code" {
                return Err(CalendarError::OAuth("bad code".into()));
            }
            Ok(OAuthTokens {
                access_token: "exchanged-access".into(),
                refresh_token: "exchanged-refresh".into(),
                expires_at: Utc::now() + TimeDelta::hours(1),
                scope: None,
            })
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn standup() -> ExternalEvent {
        ExternalEvent {
            id: "E1".into(),
            title: "Standup".into(),
            start: utc(2025, 1, 22, 14),
            end: utc(2025, 1, 22, 15),
            description: None,
            location: None,
            html_link: "https://calendar.google.com/event?eid=E1".into(),
            is_all_day: false,
        }
    }

    fn lunch() -> ExternalEvent {
        ExternalEvent {
            id: "E2".into(),
            title: "Lunch".into(),
            start: utc(2025, 1, 23, 0),
            end: utc(2025, 1, 24, 0),
            description: None,
            location: Some("Cafe".into()),
            html_link: "https://calendar.google.com/event?eid=E2".into(),
            is_all_day: true,
        }
    }

    struct Harness {
        store: Arc<InMemoryBoardStore>,
        gateway: Arc<FakeGateway>,
        service: Arc<CalendarSyncService>,
        board: Uuid,
        user: Uuid,
    }

    fn harness(gateway: FakeGateway) -> Harness {
        let store = Arc::new(InMemoryBoardStore::new());
        let gateway = Arc::new(gateway);
        let service = Arc::new(CalendarSyncService::new(
            store.clone(),
            gateway.clone(),
            TokenCodec::new(KEY),
            SyncSettings::default(),
        ));
        let board = store.add_board(BoardKind::Events);
        let user = Uuid::new_v4();
        store.add_member(board, user, BoardRole::Owner);
        Harness {
            store,
            gateway,
            service,
            board,
            user,
        }
    }

    async fn connect(h: &Harness, expires_at: DateTime<Utc>) {
        let tokens = OAuthTokens {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            expires_at,
            scope: None,
        };
        h.service.connect(h.board, &tokens, h.user).await.unwrap();
        h.store
            .select_calendar(h.board, "primary", Some("Me"))
            .await
            .unwrap();
    }

    fn stored_access_token(stored: &StoredCredential) -> String {
        TokenCodec::new(KEY)
            .decrypt(&stored.access_token_encrypted)
            .unwrap()
    }

    #[tokio::test]
    async fn unconfigured_board_fails_without_calling_provider() {
        let h = harness(FakeGateway::with_events(vec![standup()]));
        h.store
            .select_calendar(h.board, "primary", None)
            .await
            .unwrap();

        let result = h.service.sync_board(h.board).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("not fully configured"));
        assert_eq!(result.counts(), SyncCounts::default());
        assert_eq!(h.gateway.list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.gateway.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn credential_without_calendar_is_not_configured() {
        let h = harness(FakeGateway::default());
        let tokens = OAuthTokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() + TimeDelta::hours(1),
            scope: None,
        };
        h.service.connect(h.board, &tokens, h.user).await.unwrap();

        let result = h.service.sync_board(h.board).await;
        assert!(result.error.unwrap().contains("not fully configured"));
    }

    #[tokio::test]
    async fn non_events_board_is_rejected() {
        let h = harness(FakeGateway::default());
        let checklist = h.store.add_board(BoardKind::Checklist);

        let result = h.service.sync_board(checklist).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Board not found or not an Events board")
        );

        let missing = h.service.sync_board(Uuid::new_v4()).await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn creates_new_events_and_leaves_user_items_alone() {
        let h = harness(FakeGateway::with_events(vec![standup(), lunch()]));
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;
        h.store.add_synced_item(
            h.board,
            "Standup (Jan 22, 2:00 PM - 3:00 PM)",
            ExternalEventRef::from_event(&standup()),
        );
        let milk = h.store.add_item(h.board, "Buy milk");

        let result = h.service.sync_board(h.board).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.items_created, 1);
        assert_eq!(result.items_updated, 0);
        assert_eq!(result.items_deleted, 0);

        let items = h.store.items(h.board);
        assert_eq!(items.len(), 3);
        let created = items
            .iter()
            .find(|i| i.external.as_ref().is_some_and(|e| e.event_id == "E2"))
            .unwrap();
        assert_eq!(created.name, "Lunch (Jan 23)");
        assert_eq!(created.details.as_deref(), Some("Cafe"));
        assert_eq!(created.category.as_deref(), Some("Event"));
        assert!(items.iter().any(|i| i.id == milk && i.name == "Buy milk"));
        assert!(h.store.last_sync_at(h.board).is_some());
        assert_eq!(
            h.gateway.last_token.lock().unwrap().as_deref(),
            Some("access-1")
        );
    }

    #[tokio::test]
    async fn renamed_event_updates_and_missing_event_deletes() {
        let renamed = ExternalEvent {
            title: "Daily Sync".into(),
            ..standup()
        };
        let h = harness(FakeGateway::with_events(vec![renamed]));
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;
        let e1 = h.store.add_synced_item(
            h.board,
            "Standup (Jan 22, 2:00 PM - 3:00 PM)",
            ExternalEventRef::from_event(&standup()),
        );
        h.store
            .add_synced_item(h.board, "Lunch (Jan 23)", ExternalEventRef::from_event(&lunch()));

        let result = h.service.sync_board(h.board).await;

        assert!(result.success);
        assert_eq!(result.counts(), SyncCounts { created: 0, updated: 1, deleted: 1 });
        let items = h.store.items(h.board);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, e1);
        assert_eq!(items[0].name, "Daily Sync (Jan 22, 2:00 PM - 3:00 PM)");
    }

    #[tokio::test]
    async fn unchanged_calendar_still_records_sync_time() {
        let h = harness(FakeGateway::with_events(vec![]));
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;

        let result = h.service.sync_board(h.board).await;

        assert!(result.success);
        assert_eq!(result.counts(), SyncCounts::default());
        assert!(h.store.last_sync_at(h.board).is_some());
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_persisted_before_fetch() {
        let gateway = FakeGateway::with_events(vec![standup()]);
        *gateway.refresh_reply.lock().unwrap() = Some(RefreshResponse {
            access_token: Some("access-2".into()),
            expires_in: Some(3600),
        });
        let h = harness(gateway);
        connect(&h, Utc::now() + TimeDelta::minutes(4)).await;

        let result = h.service.sync_board(h.board).await;

        assert!(result.success);
        assert_eq!(h.gateway.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.gateway.last_token.lock().unwrap().as_deref(),
            Some("access-2")
        );
        let stored = h.store.calendar_credential(h.board).await.unwrap().unwrap();
        assert_eq!(stored_access_token(&stored), "access-2");
        assert!(stored.expires_at > Utc::now() + TimeDelta::minutes(55));
    }

    #[tokio::test]
    async fn rejected_refresh_fails_sync_without_fetch() {
        let h = harness(FakeGateway::with_events(vec![standup()]));
        connect(&h, Utc::now() - TimeDelta::minutes(1)).await;

        let result = h.service.sync_board(h.board).await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Token refresh failed"));
        assert_eq!(h.gateway.list_calls.load(Ordering::SeqCst), 0);
        assert!(h.store.last_sync_at(h.board).is_none());
    }

    #[tokio::test]
    async fn provider_error_leaves_board_untouched() {
        let gateway = FakeGateway::with_events(vec![standup()]);
        *gateway.events_error.lock().unwrap() = Some("HTTP 503".into());
        let h = harness(gateway);
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;
        h.store
            .add_synced_item(h.board, "Lunch (Jan 23)", ExternalEventRef::from_event(&lunch()));

        let result = h.service.sync_board(h.board).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("HTTP 503"));
        assert_eq!(h.store.items(h.board).len(), 1);
        assert!(h.store.last_sync_at(h.board).is_none());
    }

    #[tokio::test]
    async fn failed_apply_reports_zero_counts() {
        let h = harness(FakeGateway::with_events(vec![standup(), lunch()]));
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;
        h.store.fail_next_apply();

        let result = h.service.sync_board(h.board).await;

        assert!(!result.success);
        assert_eq!(result.counts(), SyncCounts::default());
        assert!(result.error.unwrap().starts_with("Persistence error"));
        assert!(h.store.items(h.board).is_empty());
        assert!(h.store.last_sync_at(h.board).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let gateway = FakeGateway {
            fetch_delay: Some(Duration::from_secs(120)),
            ..FakeGateway::with_events(vec![standup()])
        };
        let h = harness(gateway);
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;

        let result = h.service.sync_board(h.board).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn concurrent_sync_for_same_board_is_rejected() {
        let gateway = FakeGateway {
            gate: Some(Notify::new()),
            ..FakeGateway::with_events(vec![standup()])
        };
        let h = harness(gateway);
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;

        let service = h.service.clone();
        let board = h.board;
        let first = tokio::spawn(async move { service.sync_board(board).await });
        h.gateway.entered.notified().await;

        let second = h.service.sync_board(h.board).await;
        assert!(!second.success);
        assert!(second.error.unwrap().contains("already in progress"));

        if let Some(gate) = &h.gateway.gate {
            gate.notify_one();
        }
        let first = first.await.unwrap();
        assert!(first.success);
        assert_eq!(first.items_created, 1);
        assert_eq!(h.gateway.list_calls.load(Ordering::SeqCst), 1);

        // The board is free again once the first sync finishes.
        if let Some(gate) = &h.gateway.gate {
            gate.notify_one();
        }
        let third = h.service.sync_board(h.board).await;
        assert!(third.success, "{:?}", third.error);
    }

    #[tokio::test]
    async fn sync_range_bounds() {
        let h = harness(FakeGateway::default());

        for bad in [0, 366, -1] {
            let err = h.service.update_sync_range(h.board, bad).await.unwrap_err();
            assert!(matches!(err, CalendarError::InvalidRange(d) if d == bad));
        }
        assert_eq!(h.store.sync_range_days(h.board).await.unwrap(), Some(14));

        for good in [1, 365] {
            h.service.update_sync_range(h.board, good).await.unwrap();
            assert_eq!(h.store.sync_range_days(h.board).await.unwrap(), Some(good));
        }
    }

    #[tokio::test]
    async fn status_reflects_connection_without_tokens() {
        let h = harness(FakeGateway::default());

        let before = h.service.get_sync_status(h.board).await.unwrap().unwrap();
        assert!(!before.is_connected);
        assert!(!before.has_credentials);
        assert_eq!(before.sync_range_days, 14);

        connect(&h, Utc::now() + TimeDelta::hours(1)).await;
        let after = h.service.get_sync_status(h.board).await.unwrap().unwrap();
        assert!(after.is_connected);
        assert_eq!(after.calendar_id.as_deref(), Some("primary"));
        assert_eq!(after.calendar_name.as_deref(), Some("Me"));
        assert_eq!(after.connected_by, Some(h.user));

        let json = serde_json::to_string(&after).unwrap();
        assert!(!json.contains("access-1"));
        assert!(!json.contains("refresh-1"));

        assert!(
            h.service
                .get_sync_status(Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn disconnect_clears_connection_and_keeps_items() {
        let h = harness(FakeGateway::with_events(vec![standup()]));
        connect(&h, Utc::now() + TimeDelta::hours(1)).await;
        assert!(h.service.sync_board(h.board).await.success);

        h.service.disconnect(h.board).await.unwrap();

        let status = h.service.get_sync_status(h.board).await.unwrap().unwrap();
        assert!(!status.is_connected);
        assert!(!status.has_credentials);
        assert!(status.calendar_id.is_none());
        assert!(status.last_sync_at.is_none());
        assert_eq!(h.store.items(h.board).len(), 1);
        assert!(!h.service.sync_board(h.board).await.success);
    }

    #[tokio::test]
    async fn select_calendar_requires_credential() {
        let h = harness(FakeGateway::default());
        let err = h
            .service
            .select_calendar(h.board, "primary", Some("Me"))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::NotConfigured));

        connect(&h, Utc::now() + TimeDelta::hours(1)).await;
        h.service
            .select_calendar(h.board, "team@group.calendar.google.com", Some("Team"))
            .await
            .unwrap();
        let link = h.store.calendar_link(h.board).await.unwrap().unwrap();
        assert_eq!(link.calendar_id, "team@group.calendar.google.com");
    }

    #[tokio::test]
    async fn available_calendars_uses_valid_token() {
        let gateway = FakeGateway::default();
        *gateway.refresh_reply.lock().unwrap() = Some(RefreshResponse {
            access_token: Some("access-3".into()),
            expires_in: None,
        });
        let h = harness(gateway);
        connect(&h, Utc::now()).await;

        let calendars = h.service.available_calendars(h.board).await.unwrap();

        assert_eq!(calendars.len(), 1);
        assert_eq!(
            h.gateway.last_token.lock().unwrap().as_deref(),
            Some("access-3")
        );
    }

    #[tokio::test]
    async fn completed_connection_stores_encrypted_tokens() {
        let h = harness(FakeGateway::default());

        h.service
            .complete_connection(h.board, "good-code", h.user)
            .await
            .unwrap();

        let stored = h.store.calendar_credential(h.board).await.unwrap().unwrap();
        assert_ne!(stored.access_token_encrypted, "exchanged-access");
        assert_eq!(stored_access_token(&stored), "exchanged-access");
        assert!(matches!(
            h.service.complete_connection(h.board, "bad", h.user).await,
            Err(CalendarError::OAuth(_))
        ));
    }

    #[tokio::test]
    async fn authorization_url_requires_events_board() {
        let h = harness(FakeGateway::default());
        let url = h.service.authorization_url(h.board, "s1").await.unwrap();
        assert!(url.ends_with("state=s1"));

        let checklist = h.store.add_board(BoardKind::Checklist);
        assert!(matches!(
            h.service.authorization_url(checklist, "s2").await,
            Err(CalendarError::BoardNotFound)
        ));
    }
}
