//! Parking sessions and the settled payments that gate their exit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  Active,
  Completed,
  Cancelled,
}

impl std::fmt::Display for SessionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Active => "active",
      Self::Completed => "completed",
      Self::Cancelled => "cancelled",
    })
  }
}

/// One visit of one vehicle. `exit_time` and the terminal status are written
/// exactly once; the row is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub session_id:     Uuid,
  pub vehicle_id:     Uuid,
  pub zone_id:        Uuid,
  pub space_id:       Uuid,
  /// Set when the session was opened by a reservation check-in.
  pub reservation_id: Option<Uuid>,
  pub ticket:         String,
  pub entry_time:     DateTime<Utc>,
  pub entry_gate:     Option<String>,
  pub exit_time:      Option<DateTime<Utc>>,
  pub exit_gate:      Option<String>,
  pub status:         SessionStatus,
}

impl Session {
  pub fn is_active(&self) -> bool { self.status == SessionStatus::Active }
}

/// A settlement against a session. At most one settled payment exists per
/// session; overstays top up that same payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
  pub payment_id:  Uuid,
  pub session_id:  Uuid,
  pub amount:      Decimal,
  /// The discount redeemed by this payment, if any.
  pub discount_id: Option<Uuid>,
  pub settled:     bool,
  pub settled_at:  Option<DateTime<Utc>>,
  pub receipt:     String,
}
