//! Handlers for session endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sessions/entry` | Body: [`EntryRequest`]; 201 + session, ticket, space |
//! | `GET`  | `/sessions/{id}` | |
//! | `GET`  | `/sessions/{id}/fee` | Optional `?discount_code=`; never redeems |
//! | `POST` | `/sessions/exit` | Body: `{"ticket":"TKT-…","exit_gate":"…"}`; 402 if unpaid |
//! | `POST` | `/sessions/{id}/cancel` | Body: `{"reason":"…"}` |
//! | `GET`  | `/tickets/{ticket}/validate-exit` | |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use carpark_core::{
  ParkingEngine,
  lifecycle::{EntryRequest, ExitCheck, ExitReceipt, FeeQuote},
  session::Session,
  store::ParkingStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// `POST /sessions/entry`
pub async fn entry<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<EntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let entry = engine.enter(body).await?;
  Ok((StatusCode::CREATED, Json(entry)))
}

/// `GET /sessions/{id}`
pub async fn get_one<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
  Ok(Json(engine.get_session(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct FeeParams {
  pub discount_code: Option<String>,
}

/// `GET /sessions/{id}/fee[?discount_code=CODE]`
pub async fn fee<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<FeeParams>,
) -> Result<Json<FeeQuote>, ApiError> {
  let quote = engine.calculate_fee(id, params.discount_code.as_deref()).await?;
  Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
pub struct ExitBody {
  pub ticket:    String,
  pub exit_gate: Option<String>,
}

/// `POST /sessions/exit`
pub async fn exit<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<ExitBody>,
) -> Result<Json<ExitReceipt>, ApiError> {
  Ok(Json(engine.exit(&body.ticket, body.exit_gate).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
  pub reason: Option<String>,
}

/// `POST /sessions/{id}/cancel`
pub async fn cancel<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CancelBody>,
) -> Result<Json<Session>, ApiError> {
  Ok(Json(engine.cancel_session(id, body.reason.as_deref()).await?))
}

/// `GET /tickets/{ticket}/validate-exit`
pub async fn validate_exit<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Path(ticket): Path<String>,
) -> Result<Json<ExitCheck>, ApiError> {
  Ok(Json(engine.validate_exit(&ticket).await?))
}
