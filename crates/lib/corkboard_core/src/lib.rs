//! # corkboard_core
//!
//! Core domain logic for Corkboard: board calendar credentials, Google
//! Calendar access, event reconciliation, and the board sync service.

pub mod calendar;
pub mod models;

/// Embedded schema migrations from `corkboard_core/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
