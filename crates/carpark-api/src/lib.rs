//! JSON HTTP API over a [`ParkingEngine`].
//!
//! Every handler is generic over the [`ParkingStore`] behind the engine, so
//! the router can be exercised against an in-memory store in tests. Errors
//! map to status codes by [`carpark_core::ErrorKind`]; see [`error`].

pub mod error;
pub mod facility;
pub mod memberships;
pub mod payments;
pub mod reservations;
pub mod sessions;

use axum::{
  Router,
  routing::{get, post},
};
use carpark_core::{ParkingEngine, store::ParkingStore};

/// Build the router with every route mounted and `engine` as state.
pub fn api_router<S: ParkingStore + 'static>(engine: ParkingEngine<S>) -> Router<()> {
  Router::new()
    // Sessions
    .route("/sessions/entry", post(sessions::entry::<S>))
    .route("/sessions/exit", post(sessions::exit::<S>))
    .route("/sessions/{id}", get(sessions::get_one::<S>))
    .route("/sessions/{id}/fee", get(sessions::fee::<S>))
    .route("/sessions/{id}/cancel", post(sessions::cancel::<S>))
    .route("/tickets/{ticket}/validate-exit", get(sessions::validate_exit::<S>))
    // Payments
    .route("/payments", post(payments::settle::<S>))
    // Reservations
    .route("/reservations", post(reservations::book::<S>))
    .route("/reservations/sweep", post(reservations::sweep::<S>))
    .route("/reservations/{id}", get(reservations::get_one::<S>))
    .route("/reservations/by-confirmation/{code}", get(reservations::by_confirmation::<S>))
    .route("/reservations/{id}/check-in", post(reservations::check_in::<S>))
    .route("/reservations/{id}/cancel", post(reservations::cancel::<S>))
    .route("/zones/{id}/availability", get(reservations::availability::<S>))
    // Facility
    .route(
      "/zones",
      get(facility::list_zones::<S>).post(facility::create_zone::<S>),
    )
    .route(
      "/zones/{id}/spaces",
      get(facility::list_spaces::<S>).post(facility::create_space::<S>),
    )
    .route("/spaces/{id}/maintenance", post(facility::maintenance::<S>))
    .route("/vehicles", post(facility::create_vehicle::<S>))
    .route("/rates", get(facility::list_rates::<S>).post(facility::create_rate::<S>))
    .route("/discounts", post(facility::create_discount::<S>))
    .route("/membership-plans", post(facility::create_plan::<S>))
    .route("/memberships", post(facility::create_membership::<S>))
    // Memberships
    .route("/memberships/{id}", get(memberships::get_one::<S>))
    .route("/memberships/{id}/usage", get(memberships::usage::<S>))
    .route("/memberships/{id}/cancel", post(memberships::cancel::<S>))
    .route("/memberships/{id}/renew", post(memberships::renew::<S>))
    .with_state(engine)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use carpark_core::{Policy, clock::ManualClock};
  use carpark_store_sqlite::SqliteStore;
  use chrono::{DateTime, TimeDelta, TimeZone, Utc};
  use rust_decimal::Decimal;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use super::*;

  fn t(h: u32, m: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap() }

  struct Harness {
    engine: ParkingEngine<SqliteStore>,
    clock:  ManualClock,
    zone:   String,
  }

  async fn call(
    engine: &ParkingEngine<SqliteStore>,
    method: &str,
    uri:    &str,
    body:   Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(engine.clone()).oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  /// One zone with `spaces` standard spaces, a 5/h rate with 15 minutes of
  /// grace, and vehicles `ABC123` and `XYZ789`, all set up over HTTP.
  async fn harness(spaces: usize) -> Harness {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let clock = ManualClock::new(t(8, 0));
    let engine = ParkingEngine::new(Arc::new(store), Arc::new(clock.clone()), Policy::default());

    let (status, zone) =
      call(&engine, "POST", "/zones", Some(json!({ "name": "Level 1", "level": 1 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let zone = zone["zone_id"].as_str().unwrap().to_string();

    for i in 0..spaces {
      let (status, _) = call(
        &engine,
        "POST",
        &format!("/zones/{zone}/spaces"),
        Some(json!({ "label": format!("L1-{i:02}") })),
      )
      .await;
      assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = call(
      &engine,
      "POST",
      "/rates",
      Some(json!({
        "name": "Standard hourly",
        "zone_id": null,
        "kind": "hourly",
        "amount": "5",
        "grace_minutes": 15,
        "effective_from": "2025-01-01T00:00:00Z",
        "effective_to": null,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for plate in ["ABC123", "XYZ789"] {
      let (status, _) =
        call(&engine, "POST", "/vehicles", Some(json!({ "license_plate": plate }))).await;
      assert_eq!(status, StatusCode::CREATED);
    }

    Harness { engine, clock, zone }
  }

  fn decimal(v: &Value) -> Decimal { v.as_str().unwrap().parse().unwrap() }

  // ── Sessions ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn full_visit_over_http() {
    let h = harness(2).await;

    let (status, entry) = call(
      &h.engine,
      "POST",
      "/sessions/entry",
      Some(json!({ "license_plate": "abc123", "entry_gate": "north" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let ticket = entry["ticket"].as_str().unwrap().to_string();
    let session_id = entry["session"]["session_id"].as_str().unwrap().to_string();
    assert_eq!(entry["session"]["status"], "active");

    h.clock.advance(TimeDelta::minutes(130));

    let (status, quote) =
      call(&h.engine, "GET", &format!("/sessions/{session_id}/fee"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&quote["total"]), Decimal::from(10));

    let exit = json!({ "ticket": ticket, "exit_gate": "south" });
    let (status, err) = call(&h.engine, "POST", "/sessions/exit", Some(exit.clone())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(err["error"].as_str().unwrap().contains("payment required"));

    let (status, receipt) = call(
      &h.engine,
      "POST",
      "/payments",
      Some(json!({ "session_id": session_id, "amount": "10.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["top_up"], false);

    let (status, check) =
      call(&h.engine, "GET", &format!("/tickets/{ticket}/validate-exit"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["can_exit"], true);

    let (status, done) = call(&h.engine, "POST", "/sessions/exit", Some(exit.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["session"]["status"], "completed");

    let (status, _) = call(&h.engine, "POST", "/sessions/exit", Some(exit)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[tokio::test]
  async fn unknown_vehicle_and_ticket_are_404() {
    let h = harness(1).await;

    let (status, _) = call(
      &h.engine,
      "POST",
      "/sessions/entry",
      Some(json!({ "license_plate": "NOPE000" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) =
      call(&h.engine, "GET", "/tickets/TKT-MISSING/validate-exit", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn full_zone_is_409() {
    let h = harness(1).await;

    let (status, _) = call(
      &h.engine,
      "POST",
      "/sessions/entry",
      Some(json!({ "license_plate": "ABC123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(
      &h.engine,
      "POST",
      "/sessions/entry",
      Some(json!({ "license_plate": "XYZ789" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn cancel_frees_the_space() {
    let h = harness(1).await;

    let (_, entry) = call(
      &h.engine,
      "POST",
      "/sessions/entry",
      Some(json!({ "license_plate": "ABC123" })),
    )
    .await;
    let session_id = entry["session"]["session_id"].as_str().unwrap().to_string();

    let (status, session) = call(
      &h.engine,
      "POST",
      &format!("/sessions/{session_id}/cancel"),
      Some(json!({ "reason": "gate fault" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["status"], "cancelled");

    let (status, spaces) = call(&h.engine, "GET", &format!("/zones/{}/spaces", h.zone), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(spaces[0]["status"], "available");
  }

  // ── Reservations ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn overlapping_booking_on_last_space_is_409() {
    let h = harness(1).await;

    let (status, first) = call(
      &h.engine,
      "POST",
      "/reservations",
      Some(json!({
        "license_plate": "ABC123",
        "zone_id": h.zone,
        "start": "2025-06-02T09:00:00Z",
        "end": "2025-06-02T10:00:00Z",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["status"], "confirmed");

    let (status, _) = call(
      &h.engine,
      "POST",
      "/reservations",
      Some(json!({
        "license_plate": "XYZ789",
        "zone_id": h.zone,
        "start": "2025-06-02T09:30:00Z",
        "end": "2025-06-02T10:30:00Z",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, avail) = call(
      &h.engine,
      "GET",
      &format!(
        "/zones/{}/availability?start=2025-06-02T10:00:00Z&end=2025-06-02T11:00:00Z",
        h.zone
      ),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(avail["free"], 1);
  }

  #[tokio::test]
  async fn inverted_window_is_400() {
    let h = harness(1).await;

    let (status, _) = call(
      &h.engine,
      "POST",
      "/reservations",
      Some(json!({
        "license_plate": "ABC123",
        "zone_id": h.zone,
        "start": "2025-06-02T11:00:00Z",
        "end": "2025-06-02T10:00:00Z",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
      call(&h.engine, "GET", &format!("/zones/{}/availability", h.zone), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn check_in_then_sweep() {
    let h = harness(2).await;

    let (_, booked) = call(
      &h.engine,
      "POST",
      "/reservations",
      Some(json!({
        "license_plate": "ABC123",
        "zone_id": h.zone,
        "start": "2025-06-02T09:00:00Z",
        "end": "2025-06-02T10:00:00Z",
      })),
    )
    .await;
    let id = booked["reservation_id"].as_str().unwrap().to_string();

    h.clock.set(t(9, 5));
    let (status, entry) = call(
      &h.engine,
      "POST",
      &format!("/reservations/{id}/check-in"),
      Some(json!({ "entry_gate": "north" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["session"]["reservation_id"], id.as_str());

    let (_, reservation) = call(&h.engine, "GET", &format!("/reservations/{id}"), None).await;
    assert_eq!(reservation["status"], "checked_in");

    h.clock.set(t(10, 30));
    let (status, report) = call(&h.engine, "POST", "/reservations/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["expired"], 1);
    assert_eq!(report["no_shows"], 0);
  }

  #[tokio::test]
  async fn reservation_is_found_by_confirmation_code() {
    let h = harness(1).await;

    let (_, booked) = call(
      &h.engine,
      "POST",
      "/reservations",
      Some(json!({
        "license_plate": "ABC123",
        "zone_id": h.zone,
        "start": "2025-06-02T09:00:00Z",
        "end": "2025-06-02T10:00:00Z",
      })),
    )
    .await;
    let code = booked["confirmation"].as_str().unwrap().to_lowercase();

    let (status, found) =
      call(&h.engine, "GET", &format!("/reservations/by-confirmation/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["reservation_id"], booked["reservation_id"]);

    let (status, _) =
      call(&h.engine, "GET", "/reservations/by-confirmation/RSV-NOTHING", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  // ── Facility ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn duplicates_are_409() {
    let h = harness(1).await;

    let (status, body) = call(
      &h.engine,
      "POST",
      &format!("/zones/{}/spaces", h.zone),
      Some(json!({ "label": "L1-00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    let (status, _) =
      call(&h.engine, "POST", "/vehicles", Some(json!({ "license_plate": " abc123 " }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn peak_rate_surcharge_over_http() {
    let h = harness(1).await;

    let (status, rate) = call(
      &h.engine,
      "POST",
      "/rates",
      Some(json!({
        "name": "Level 1 peak",
        "zone_id": h.zone,
        "kind": "hourly",
        "amount": "5",
        "grace_minutes": 0,
        "effective_from": "2025-06-01T00:00:00Z",
        "effective_to": null,
        "peak": { "start": "08:00:00", "end": "10:00:00", "multiplier": "1.5" },
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rate["peak"]["start"], "08:00:00");

    let (_, entry) = call(
      &h.engine,
      "POST",
      "/sessions/entry",
      Some(json!({ "license_plate": "ABC123" })),
    )
    .await;
    let session_id = entry["session"]["session_id"].as_str().unwrap().to_string();

    h.clock.set(t(9, 30));
    let (status, quote) =
      call(&h.engine, "GET", &format!("/sessions/{session_id}/fee"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&quote["base_fee"]), Decimal::new(1500, 2));
    assert_eq!(quote["breakdown"].as_array().unwrap().len(), 2);
  }

  // ── Memberships ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn membership_lifecycle_over_http() {
    let h = harness(1).await;

    let (status, plan) = call(
      &h.engine,
      "POST",
      "/membership-plans",
      Some(json!({
        "name": "Commuter",
        "discount_percent": "20",
        "included_hours": 10,
        "duration_months": 1,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, vehicle) =
      call(&h.engine, "POST", "/vehicles", Some(json!({ "license_plate": "MEM001" }))).await;
    let (status, membership) = call(
      &h.engine,
      "POST",
      "/memberships",
      Some(json!({
        "plan_id": plan["plan_id"],
        "vehicle_ids": [vehicle["vehicle_id"]],
        "valid_from": "2025-06-01",
        "valid_to": "2025-06-30",
        "auto_renew": false,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = membership["membership_id"].as_str().unwrap().to_string();

    let (status, usage) = call(&h.engine, "GET", &format!("/memberships/{id}/usage"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["days_remaining"], 28);
    assert_eq!(decimal(&usage["remaining_hours"]), Decimal::from(10));

    let (status, cancelled) =
      call(&h.engine, "POST", &format!("/memberships/{id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = call(&h.engine, "POST", &format!("/memberships/{id}/cancel"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, renewed) =
      call(&h.engine, "POST", &format!("/memberships/{id}/renew"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renewed["status"], "active");
    assert_eq!(renewed["valid_to"], "2025-07-02");

    let (status, shown) = call(&h.engine, "GET", &format!("/memberships/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["plan"]["name"], "Commuter");

    let missing = uuid::Uuid::now_v7();
    let (status, _) = call(&h.engine, "GET", &format!("/memberships/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }
}
