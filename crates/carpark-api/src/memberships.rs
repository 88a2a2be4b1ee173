//! Handlers for an enrolled membership.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/memberships/{id}` | Membership with its plan |
//! | `GET`  | `/memberships/{id}/usage` | Hours and days left |
//! | `POST` | `/memberships/{id}/cancel` | 422 unless active |
//! | `POST` | `/memberships/{id}/renew` | Extends by one plan term |

use axum::{
  Json,
  extract::{Path, State},
};
use carpark_core::{
  ParkingEngine,
  membership::{MemberBenefit, Membership, MembershipUsage},
  store::ParkingStore,
};
use uuid::Uuid;

use crate::error::ApiError;

pub async fn get_one<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<MemberBenefit>, ApiError> {
  Ok(Json(engine.get_membership(id).await?))
}

pub async fn usage<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<MembershipUsage>, ApiError> {
  Ok(Json(engine.membership_usage(id).await?))
}

pub async fn cancel<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Membership>, ApiError> {
  Ok(Json(engine.cancel_membership(id).await?))
}

pub async fn renew<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Membership>, ApiError> {
  Ok(Json(engine.renew_membership(id).await?))
}
