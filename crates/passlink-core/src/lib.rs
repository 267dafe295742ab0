//! Core domain + application logic for the passlink bot.
//!
//! This crate is framework-agnostic. Telegram and the SQLite backend live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod membership;
pub mod messaging;
pub mod store;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
