//! Vehicles known to the facility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
  pub vehicle_id:    Uuid,
  /// Always upper-case; see [`normalize_plate`].
  pub license_plate: String,
  /// EV spaces are only ever auto-assigned to EVs.
  pub is_ev:         bool,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVehicle {
  pub license_plate: String,
  #[serde(default)]
  pub is_ev:         bool,
}

/// Plates are matched case-insensitively and without surrounding whitespace.
pub fn normalize_plate(plate: &str) -> String { plate.trim().to_uppercase() }
