//! Opaque tokens handed to end users in place of internal identities.

use uuid::Uuid;

fn hex_prefix(len: usize) -> String {
  let mut hex = Uuid::new_v4().simple().to_string();
  hex.truncate(len);
  hex.to_uppercase()
}

/// Parking ticket, e.g. `TKT-3F9A0C11B2DE`.
pub fn ticket() -> String { format!("TKT-{}", hex_prefix(12)) }

/// Reservation confirmation, e.g. `RSV-7D01AA3C`.
pub fn confirmation() -> String { format!("RSV-{}", hex_prefix(8)) }

/// Payment receipt, e.g. `RCP-0B44E2F9A170`.
pub fn receipt() -> String { format!("RCP-{}", hex_prefix(12)) }
