//! Request-independent service helpers.

pub mod auth;
pub mod permissions;
