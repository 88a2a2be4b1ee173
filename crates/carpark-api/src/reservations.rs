//! Handlers for reservation endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/reservations` | Body: [`BookingRequest`]; 201, or 409 on conflict |
//! | `GET`  | `/reservations/{id}` | |
//! | `GET`  | `/reservations/by-confirmation/{code}` | Case-insensitive |
//! | `POST` | `/reservations/{id}/check-in` | Body: `{"entry_gate":"…"}` |
//! | `POST` | `/reservations/{id}/cancel` | |
//! | `POST` | `/reservations/sweep` | Marks ended reservations no-show / expired |
//! | `GET`  | `/zones/{id}/availability` | `?start=&end=` (RFC 3339) |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use carpark_core::{
  ParkingEngine,
  reservation::{Availability, BookingRequest, Reservation},
  store::{ParkingStore, SweepReport},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// `POST /reservations`
pub async fn book<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<BookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let reservation = engine.book_reservation(body).await?;
  Ok((StatusCode::CREATED, Json(reservation)))
}

/// `GET /reservations/{id}`
pub async fn get_one<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
  Ok(Json(engine.get_reservation(id).await?))
}

/// `GET /reservations/by-confirmation/{code}`
pub async fn by_confirmation<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(code): Path<String>,
) -> Result<Json<Reservation>, ApiError> {
  Ok(Json(engine.reservation_by_confirmation(&code).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckInBody {
  pub entry_gate: Option<String>,
}

/// `POST /reservations/{id}/check-in`
pub async fn check_in<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CheckInBody>,
) -> Result<impl IntoResponse, ApiError> {
  let entry = engine.check_in(id, body.entry_gate).await?;
  Ok((StatusCode::CREATED, Json(entry)))
}

/// `POST /reservations/{id}/cancel`
pub async fn cancel<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
  Ok(Json(engine.cancel_reservation(id).await?))
}

/// `POST /reservations/sweep`
pub async fn sweep<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
) -> Result<Json<SweepReport>, ApiError> {
  Ok(Json(engine.sweep_reservations().await?))
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
  pub start: Option<DateTime<Utc>>,
  pub end:   Option<DateTime<Utc>>,
}

/// `GET /zones/{id}/availability?start=…&end=…`
pub async fn availability<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(zone_id): Path<Uuid>,
  Query(params): Query<WindowParams>,
) -> Result<Json<Availability>, ApiError> {
  let (Some(start), Some(end)) = (params.start, params.end) else {
    return Err(ApiError::BadRequest("both `start` and `end` are required".into()));
  };
  Ok(Json(engine.check_availability(zone_id, start, end).await?))
}
