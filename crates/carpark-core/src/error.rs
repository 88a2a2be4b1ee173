//! Error types for `carpark-core`.
//!
//! Every failure the engine can surface maps onto one [`ErrorKind`], which is
//! what outer layers (HTTP, CLI) dispatch on.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::discount::DiscountRejection;

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ─────────────────────────────────────────────────────────
  #[error("vehicle not found: {0}")]
  VehicleNotFound(String),

  #[error("session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("ticket not found: {0}")]
  TicketNotFound(String),

  #[error("reservation not found: {0}")]
  ReservationNotFound(Uuid),

  #[error("no reservation with confirmation {0}")]
  ConfirmationNotFound(String),

  #[error("zone not found: {0}")]
  ZoneNotFound(Uuid),

  #[error("space not found: {0}")]
  SpaceNotFound(Uuid),

  #[error("membership plan not found: {0}")]
  PlanNotFound(Uuid),

  #[error("membership not found: {0}")]
  MembershipNotFound(Uuid),

  // ── Conflicts (the whole operation may be retried) ────────────────────
  #[error("no space available")]
  NoSpaceAvailable,

  #[error("vehicle {plate} already has an active session (ticket {ticket})")]
  VehicleAlreadyParked { plate: String, ticket: String },

  #[error("reservation window conflicts with existing bookings in zone {0}")]
  WindowConflict(Uuid),

  #[error("session {0} is already paid")]
  AlreadySettled(Uuid),

  #[error("space {0} is occupied")]
  SpaceOccupied(Uuid),

  #[error("{0} already exists")]
  AlreadyExists(String),

  // ── Logic / clock faults (never retried) ──────────────────────────────
  #[error("invalid state: {0}")]
  InvalidState(String),

  // ── User-actionable ───────────────────────────────────────────────────
  #[error("payment required: {due} due, {paid} paid")]
  PaymentRequired { due: Decimal, paid: Decimal },

  // ── Input validation ──────────────────────────────────────────────────
  #[error("discount {code:?} rejected: {reason}")]
  DiscountInvalid {
    code:   String,
    reason: DiscountRejection,
  },

  #[error("invalid rate: {0}")]
  InvalidRate(String),

  #[error("invalid reservation window: {0}")]
  InvalidWindow(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  // ── Storage ───────────────────────────────────────────────────────────
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  Conflict,
  InvalidState,
  PaymentRequired,
  InvalidInput,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::VehicleNotFound(_)
      | Self::SessionNotFound(_)
      | Self::TicketNotFound(_)
      | Self::ReservationNotFound(_)
      | Self::ConfirmationNotFound(_)
      | Self::ZoneNotFound(_)
      | Self::SpaceNotFound(_)
      | Self::PlanNotFound(_)
      | Self::MembershipNotFound(_) => ErrorKind::NotFound,
      Self::NoSpaceAvailable
      | Self::VehicleAlreadyParked { .. }
      | Self::WindowConflict(_)
      | Self::AlreadySettled(_)
      | Self::SpaceOccupied(_)
      | Self::AlreadyExists(_) => ErrorKind::Conflict,
      Self::InvalidState(_) => ErrorKind::InvalidState,
      Self::PaymentRequired { .. } => ErrorKind::PaymentRequired,
      Self::DiscountInvalid { .. }
      | Self::InvalidRate(_)
      | Self::InvalidWindow(_)
      | Self::InvalidInput(_) => ErrorKind::InvalidInput,
      Self::Store(_) => ErrorKind::Internal,
    }
  }

  /// Box a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
