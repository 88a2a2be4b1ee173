//! Administrative endpoints that populate the facility.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `GET`/`POST` | `/zones` | [`NewZone`] |
//! | `GET`/`POST` | `/zones/{id}/spaces` | `{"label":"A-01","space_type":"ev"}` |
//! | `POST` | `/spaces/{id}/maintenance` | `{"maintenance":true}` |
//! | `POST` | `/vehicles` | [`NewVehicle`] |
//! | `GET`/`POST` | `/rates` | [`NewRate`] |
//! | `POST` | `/discounts` | [`NewDiscount`] |
//! | `POST` | `/membership-plans` | [`NewMembershipPlan`] |
//! | `POST` | `/memberships` | [`NewMembership`] |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use carpark_core::{
  ParkingEngine,
  discount::NewDiscount,
  membership::{NewMembership, NewMembershipPlan},
  rate::{NewRate, Rate},
  space::{NewSpace, NewZone, Space, SpaceType, Zone},
  store::ParkingStore,
  vehicle::NewVehicle,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Zones & spaces ───────────────────────────────────────────────────────────

pub async fn list_zones<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
) -> Result<Json<Vec<Zone>>, ApiError> {
  Ok(Json(engine.list_zones().await?))
}

pub async fn create_zone<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<NewZone>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.register_zone(body).await?)))
}

/// Spaces with their derived status (`reserved` included).
pub async fn list_spaces<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(zone_id): Path<Uuid>,
) -> Result<Json<Vec<Space>>, ApiError> {
  Ok(Json(engine.list_spaces(zone_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SpaceBody {
  pub label:      String,
  #[serde(default = "standard")]
  pub space_type: SpaceType,
}

fn standard() -> SpaceType { SpaceType::Standard }

pub async fn create_space<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(zone_id): Path<Uuid>,
  Json(body): Json<SpaceBody>,
) -> Result<impl IntoResponse, ApiError> {
  let space = engine
    .add_space(NewSpace { zone_id, label: body.label, space_type: body.space_type })
    .await?;
  Ok((StatusCode::CREATED, Json(space)))
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceBody {
  pub maintenance: bool,
}

pub async fn maintenance<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(space_id): Path<Uuid>,
  Json(body): Json<MaintenanceBody>,
) -> Result<Json<Space>, ApiError> {
  Ok(Json(engine.set_maintenance(space_id, body.maintenance).await?))
}

// ─── Vehicles, pricing, memberships ──────────────────────────────────────────

pub async fn create_vehicle<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<NewVehicle>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.register_vehicle(body).await?)))
}

pub async fn list_rates<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
) -> Result<Json<Vec<Rate>>, ApiError> {
  Ok(Json(engine.list_rates().await?))
}

pub async fn create_rate<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<NewRate>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_rate(body).await?)))
}

pub async fn create_discount<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<NewDiscount>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_discount(body).await?)))
}

pub async fn create_plan<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<NewMembershipPlan>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.add_plan(body).await?)))
}

pub async fn create_membership<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<NewMembership>,
) -> Result<impl IntoResponse, ApiError> {
  Ok((StatusCode::CREATED, Json(engine.enroll_membership(body).await?)))
}
