//! Google Calendar sync for Events boards.
//!
//! Keeps a board's calendar-owned items in step with the events of one
//! linked calendar: token upkeep, event fetch, diffing, and persistence.

pub mod codec;
pub mod google;
pub mod memory;
pub mod oauth;
pub mod provider;
pub mod queries;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod token;

use thiserror::Error;
use uuid::Uuid;

pub use codec::TokenCodec;
pub use provider::{CalendarAuthorizer, CalendarProvider, TokenRefresher};
pub use store::{BoardStore, PgBoardStore};
pub use sync::{CalendarSyncService, SyncSettings};

/// Calendar sync errors.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Board calendar not fully configured")]
    NotConfigured,

    #[error("Board not found or not an Events board")]
    BoardNotFound,

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Calendar provider error: {0}")]
    Provider(String),

    #[error("Sync range must be between 1 and 365 days, got {0}")]
    InvalidRange(i32),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Calendar sync already in progress for board {0}")]
    SyncInProgress(Uuid),

    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl From<sqlx::Error> for CalendarError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "calendar store query failed");
        CalendarError::Persistence(e.to_string())
    }
}
