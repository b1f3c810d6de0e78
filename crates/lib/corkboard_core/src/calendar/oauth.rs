//! Pending calendar connections between OAuth consent and callback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// How long a consent round-trip may take.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Generate an unguessable OAuth `state` parameter.
pub fn generate_state() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Who asked to connect which board.
#[derive(Debug, Clone)]
pub struct PendingConnection {
    pub board_id: Uuid,
    pub user_id: Uuid,
    pub created_at: Instant,
}

/// In-memory pending connections keyed by OAuth state.
pub struct OAuthStateStore {
    pending: DashMap<String, PendingConnection>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_ttl(STATE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Record a connection attempt and return its state parameter.
    pub fn begin(&self, board_id: Uuid, user_id: Uuid) -> String {
        let state = generate_state();
        self.pending.insert(
            state.clone(),
            PendingConnection {
                board_id,
                user_id,
                created_at: Instant::now(),
            },
        );
        state
    }

    /// Remove and return a pending connection. `None` if unknown or expired.
    pub fn take(&self, state: &str) -> Option<PendingConnection> {
        let (_, pending) = self.pending.remove(state)?;
        if pending.created_at.elapsed() >= self.ttl {
            return None;
        }
        Some(pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.pending.retain(|_, p| p.created_at.elapsed() < ttl);
    }

    /// Spawn a task evicting expired entries once a minute.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_unique_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert!(a.len() >= 32);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn take_consumes_pending_connection() {
        let store = OAuthStateStore::new();
        let board = Uuid::new_v4();
        let user = Uuid::new_v4();
        let state = store.begin(board, user);

        let pending = store.take(&state).unwrap();
        assert_eq!(pending.board_id, board);
        assert_eq!(pending.user_id, user);
        assert!(store.take(&state).is_none());
    }

    #[test]
    fn unknown_state_is_rejected() {
        assert!(OAuthStateStore::new().take("forged").is_none());
    }

    #[test]
    fn expired_state_is_rejected() {
        let store = OAuthStateStore::with_ttl(Duration::ZERO);
        let state = store.begin(Uuid::new_v4(), Uuid::new_v4());
        assert!(store.take(&state).is_none());
    }

    #[test]
    fn cleanup_evicts_expired() {
        let store = OAuthStateStore::with_ttl(Duration::ZERO);
        store.begin(Uuid::new_v4(), Uuid::new_v4());
        store.begin(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(store.len(), 2);
        store.cleanup();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn cleanup_task_can_be_aborted() {
        let store = Arc::new(OAuthStateStore::new());
        let handle = store.spawn_cleanup_task();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
