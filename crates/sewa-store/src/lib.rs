//! # sewa-store
//!
//! SQLite persistence for the booking and conversation service.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`, with typed helpers per entity. Mutations that must
//! be atomic (status compare-and-swap, payment marking, message append) run in
//! a single statement or transaction.

pub mod bookings;
pub mod conversations;
pub mod database;
pub mod listings;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod payments;
pub mod users;

mod error;
mod sql;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
