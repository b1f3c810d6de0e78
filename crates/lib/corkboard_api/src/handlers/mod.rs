//! HTTP request handlers.

pub mod calendar;
pub mod oauth;
