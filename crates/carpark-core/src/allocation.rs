//! Assigning a concrete space to an arriving vehicle.
//!
//! Candidates are read from a [`ZoneSnapshot`] outside any transaction, then
//! claimed one at a time with [`ParkingStore::claim_space`], which only
//! succeeds if the space is still free. A lost claim simply moves on.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  availability::ZoneSnapshot,
  engine::ParkingEngine,
  session::{Session, SessionStatus},
  space::SpaceType,
  store::{ClaimOutcome, ParkingStore},
  token,
  vehicle::Vehicle,
};

/// Who is parking, and where they would like to go.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
  pub vehicle:        Vehicle,
  /// Zones to try, in order.
  pub zones:          Vec<Uuid>,
  pub preference:     Option<SpaceType>,
  pub reservation_id: Option<Uuid>,
  pub entry_gate:     Option<String>,
  pub at:             DateTime<Utc>,
}

/// Spaces to try for `vehicle`, best first.
///
/// Spaces of the preferred type come first (EVs prefer EV bays), then every
/// other free space the vehicle may use. Non-EV vehicles are never put in an
/// EV bay.
pub fn candidates(
  snapshot: &ZoneSnapshot,
  vehicle: &Vehicle,
  preference: Option<SpaceType>,
  at: DateTime<Utc>,
  except: Option<Uuid>,
) -> Vec<Uuid> {
  let preferred = preference.or(vehicle.is_ev.then_some(SpaceType::Ev));
  let free = snapshot.find_free(vehicle.is_ev, None, at, except);
  let type_of = |id: &Uuid| {
    snapshot
      .spaces
      .iter()
      .find(|s| s.space_id == *id)
      .map(|s| s.space_type)
  };

  let (mut out, rest): (Vec<Uuid>, Vec<Uuid>) =
    free.into_iter().partition(|id| preferred.is_some() && type_of(id) == preferred);
  out.extend(rest);
  out
}

impl<S: ParkingStore> ParkingEngine<S> {
  /// Claim one space for the request's vehicle and open its session.
  pub async fn assign(&self, req: AllocationRequest) -> Result<Session> {
    let max_attempts = self.policy.max_claim_attempts.max(1);
    let mut attempts = 0u32;

    for &zone_id in &req.zones {
      loop {
        let Some(snapshot) = self.store.zone_snapshot(zone_id).await.map_err(Error::store)? else {
          return Err(Error::ZoneNotFound(zone_id));
        };
        let list = candidates(&snapshot, &req.vehicle, req.preference, req.at, req.reservation_id);
        if list.is_empty() {
          break;
        }

        for &space_id in &list {
          if attempts >= max_attempts {
            debug!(vehicle = %req.vehicle.license_plate, attempts, "claim attempts exhausted");
            return Err(Error::NoSpaceAvailable);
          }
          attempts += 1;

          let session = Session {
            session_id: Uuid::now_v7(),
            vehicle_id: req.vehicle.vehicle_id,
            zone_id,
            space_id,
            reservation_id: req.reservation_id,
            ticket: token::ticket(),
            entry_time: req.at,
            entry_gate: req.entry_gate.clone(),
            exit_time: None,
            exit_gate: None,
            status: SessionStatus::Active,
          };
          match self.store.claim_space(session).await.map_err(Error::store)? {
            ClaimOutcome::Claimed(session) => {
              info!(
                session_id = %session.session_id,
                vehicle = %req.vehicle.license_plate,
                %zone_id,
                %space_id,
                attempts,
                "space claimed"
              );
              return Ok(session);
            }
            ClaimOutcome::Lost => {
              debug!(%space_id, vehicle = %req.vehicle.license_plate, "claim lost, trying next");
            }
            ClaimOutcome::VehicleBusy => {
              return Err(self.already_parked(&req.vehicle).await);
            }
            ClaimOutcome::ReservationNotConfirmed => {
              return Err(Error::InvalidState(
                "reservation is no longer confirmed".into(),
              ));
            }
          }
        }
        // Every candidate was taken under us: look again.
      }
    }
    Err(Error::NoSpaceAvailable)
  }

  pub(crate) async fn already_parked(&self, vehicle: &Vehicle) -> Error {
    let ticket = match self.store.active_session_for_vehicle(vehicle.vehicle_id).await {
      Ok(Some(s)) => s.ticket,
      Ok(None) => String::new(),
      Err(e) => return Error::store(e),
    };
    Error::VehicleAlreadyParked { plate: vehicle.license_plate.clone(), ticket }
  }
}
