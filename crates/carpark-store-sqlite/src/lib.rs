//! SQLite backend for the car park engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every atomic operation of
//! [`carpark_core::store::ParkingStore`] runs inside one `BEGIN IMMEDIATE`
//! transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
