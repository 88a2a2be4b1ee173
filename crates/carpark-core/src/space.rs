//! Zones and the physical spaces inside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named subdivision of a level; the unit reservation capacity is counted
/// in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
  pub zone_id:    Uuid,
  pub name:       String,
  pub level:      i32,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::ParkingStore::add_zone`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewZone {
  pub name:  String,
  #[serde(default)]
  pub level: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceType {
  Standard,
  Compact,
  Handicapped,
  Ev,
  Motorcycle,
}

/// Status of a space. Only `available`, `occupied` and `maintenance` are
/// persisted; `reserved` is derived by [`crate::availability::ZoneSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceStatus {
  Available,
  Occupied,
  Reserved,
  Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
  pub space_id:   Uuid,
  pub zone_id:    Uuid,
  /// Painted identifier, e.g. `B2-014`.
  pub label:      String,
  pub space_type: SpaceType,
  pub status:     SpaceStatus,
}

/// Input to [`crate::store::ParkingStore::add_space`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewSpace {
  pub zone_id:    Uuid,
  pub label:      String,
  pub space_type: SpaceType,
}
