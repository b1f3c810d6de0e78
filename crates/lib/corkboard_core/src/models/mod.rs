//! Domain models shared by the core library and the HTTP API.

pub mod board;
pub mod calendar;
