//! `POST /payments`: settle a session's fee.
//!
//! Body: `{"session_id":"…","amount":"12.50","discount_code":"SAVE20"}`.
//! Returns 201 with the payment and the fee it settled; 402 when the amount
//! falls short, 409 when the session is already covered.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use carpark_core::{ParkingEngine, payment::SettleRequest, store::ParkingStore};

use crate::error::ApiError;

pub async fn settle<S: ParkingStore + 'static>(
  State(engine): State<ParkingEngine<S>>,
  Json(body): Json<SettleRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let receipt = engine.settle_payment(body).await?;
  Ok((StatusCode::CREATED, Json(receipt)))
}
