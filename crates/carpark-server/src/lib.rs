//! Wiring for the `carpark-server` binary: configuration and the top-level
//! router.

use std::{path::PathBuf, time::Duration};

use axum::Router;
use carpark_core::{ParkingEngine, Policy, store::ParkingStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CARPARK_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Run the reservation and membership sweep this often; unset disables it.
  #[serde(default)]
  pub sweep_interval_secs: Option<u64>,
  #[serde(default)]
  pub policy:              Policy,
}

impl ServerConfig {
  pub fn sweep_interval(&self) -> Option<Duration> {
    self.sweep_interval_secs.filter(|s| *s > 0).map(Duration::from_secs)
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router with request tracing.
pub fn app<S: ParkingStore + 'static>(engine: ParkingEngine<S>) -> Router {
  carpark_api::api_router(engine).layer(TraceLayer::new_for_http())
}

/// Periodically close out reservations whose window has ended and renew
/// lapsed auto-renewing memberships.
pub async fn sweep_loop<S: ParkingStore + 'static>(engine: ParkingEngine<S>, every: Duration) {
  let mut ticker = tokio::time::interval(every);
  loop {
    ticker.tick().await;
    if let Err(e) = engine.sweep_reservations().await {
      tracing::warn!(error = %e, "reservation sweep failed");
    }
    match engine.renew_lapsed_memberships().await {
      Ok(0) => {}
      Ok(renewed) => tracing::info!(renewed, "memberships auto-renewed"),
      Err(e) => tracing::warn!(error = %e, "membership renewal failed"),
    }
  }
}
