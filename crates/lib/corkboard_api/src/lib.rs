//! # corkboard_api
//!
//! HTTP API library for Corkboard board calendar sync.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use corkboard_core::calendar::CalendarSyncService;
use corkboard_core::calendar::oauth::OAuthStateStore;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{calendar, oauth};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Board calendar operations.
    pub sync: Arc<CalendarSyncService>,
    /// Pending OAuth connections keyed by state parameter.
    pub oauth_states: Arc<OAuthStateStore>,
    /// API configuration.
    pub config: ApiConfig,
}

/// Run embedded database migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    corkboard_core::MIGRATOR.run(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Google redirects the browser here without our bearer token.
    let public = Router::new().route(
        routes::GET_AUTH_GOOGLE_CALLBACK,
        get(oauth::google_callback_handler),
    );

    let protected = Router::new()
        .route(
            routes::BOARD_CALENDAR,
            get(calendar::sync_status_handler).delete(calendar::disconnect_handler),
        )
        .route(
            routes::GET_BOARD_CALENDAR_CALENDARS,
            get(calendar::list_calendars_handler),
        )
        .route(
            routes::PUT_BOARD_CALENDAR_SELECTION,
            put(calendar::select_calendar_handler),
        )
        .route(
            routes::POST_BOARD_CALENDAR_SYNC,
            post(calendar::sync_board_handler),
        )
        .route(
            routes::PUT_BOARD_CALENDAR_RANGE,
            put(calendar::update_sync_range_handler),
        )
        .route(
            routes::POST_BOARD_CALENDAR_CONNECT,
            post(oauth::connect_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
