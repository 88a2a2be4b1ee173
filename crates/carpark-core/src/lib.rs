//! Core types and the session & allocation engine for a car park.
//!
//! This crate is free of HTTP and database dependencies. Storage is reached
//! through the [`store::ParkingStore`] trait and time through
//! [`clock::Clock`], so both can be swapped in tests.

// Native `async fn` in traits; the store trait spells out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod allocation;
pub mod availability;
pub mod clock;
pub mod discount;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod membership;
pub mod payment;
pub mod rate;
pub mod reservation;
pub mod session;
pub mod space;
pub mod store;
pub mod token;
pub mod vehicle;

pub use engine::{ParkingEngine, Policy};
pub use error::{Error, ErrorKind, Result};
