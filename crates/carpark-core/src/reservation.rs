//! Advance reservations: booking, check-in, cancellation and expiry.
//!
//! Booking decides capacity on a [`ZoneSnapshot`] taken inside the same
//! store transaction as the insert, so two overlapping bookings for the last
//! space cannot both succeed.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  allocation::AllocationRequest,
  engine::ParkingEngine,
  lifecycle::Entry,
  store::{ParkingStore, SweepReport, Transition},
  token,
};

/// A half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl TimeWindow {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
    if start >= end {
      return Err(Error::InvalidWindow(format!("start {start} is not before end {end}")));
    }
    Ok(Self { start, end })
  }

  pub fn overlaps(&self, other: &TimeWindow) -> bool {
    self.start < other.end && other.start < self.end
  }

  pub fn contains(&self, at: DateTime<Utc>) -> bool { self.start <= at && at < self.end }

  pub fn duration(&self) -> TimeDelta { self.end - self.start }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
  Confirmed,
  CheckedIn,
  Cancelled,
  Expired,
  NoShow,
}

impl ReservationStatus {
  /// Whether the reservation still counts against zone capacity.
  pub fn is_live(self) -> bool { matches!(self, Self::Confirmed | Self::CheckedIn) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Confirmed => "confirmed",
      Self::CheckedIn => "checked_in",
      Self::Cancelled => "cancelled",
      Self::Expired => "expired",
      Self::NoShow => "no_show",
    }
  }
}

impl fmt::Display for ReservationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
  pub reservation_id: Uuid,
  pub vehicle_id:     Uuid,
  pub zone_id:        Uuid,
  pub window:         TimeWindow,
  pub status:         ReservationStatus,
  /// `RSV-` followed by eight hex digits.
  pub confirmation:   String,
  pub created_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
  pub license_plate: String,
  pub zone_id:       Uuid,
  pub start:         DateTime<Utc>,
  pub end:           DateTime<Utc>,
}

/// Free capacity of a zone over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
  pub zone_id:       Uuid,
  pub window:        TimeWindow,
  pub capacity:      usize,
  pub reserved:      usize,
  /// Bookable by an EV, which may use any bay.
  pub free:          usize,
  /// Bookable by a non-EV vehicle.
  pub free_standard: usize,
}

impl<S: ParkingStore> ParkingEngine<S> {
  pub async fn book_reservation(&self, req: BookingRequest) -> Result<Reservation> {
    let now = self.now();
    let window = TimeWindow::new(req.start, req.end)?;
    if window.end <= now {
      return Err(Error::InvalidWindow("window is entirely in the past".into()));
    }
    let horizon = now + TimeDelta::days(self.policy.max_reservation_days_ahead);
    if window.start > horizon {
      return Err(Error::InvalidWindow(format!(
        "start is more than {} days ahead",
        self.policy.max_reservation_days_ahead
      )));
    }

    let vehicle = self.vehicle_by_plate(&req.license_plate).await?;
    self.zone(req.zone_id).await?;

    let reservation = Reservation {
      reservation_id: Uuid::now_v7(),
      vehicle_id: vehicle.vehicle_id,
      zone_id: req.zone_id,
      window,
      status: ReservationStatus::Confirmed,
      confirmation: token::confirmation(),
      created_at: now,
    };
    let projection = self.policy.projection();
    let is_ev = vehicle.is_ev;
    let admitted = self
      .store
      .book_reservation(reservation, move |snapshot| {
        snapshot.free_capacity(&window, now, projection, is_ev) >= 1
      })
      .await
      .map_err(Error::store)?;

    match admitted {
      Some(r) => {
        info!(
          reservation_id = %r.reservation_id,
          confirmation = %r.confirmation,
          vehicle = %vehicle.license_plate,
          zone_id = %r.zone_id,
          start = %r.window.start,
          end = %r.window.end,
          "reservation booked"
        );
        Ok(r)
      }
      None => Err(Error::WindowConflict(req.zone_id)),
    }
  }

  pub async fn check_availability(
    &self,
    zone_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Availability> {
    let window = TimeWindow::new(start, end)?;
    let snapshot = self
      .store
      .zone_snapshot(zone_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ZoneNotFound(zone_id))?;
    let (now, projection) = (self.now(), self.policy.projection());
    Ok(Availability {
      zone_id,
      window,
      capacity: snapshot.capacity(),
      reserved: snapshot.peak_reserved(&window),
      free: snapshot.free_capacity(&window, now, projection, true),
      free_standard: snapshot.free_capacity(&window, now, projection, false),
    })
  }

  pub async fn get_reservation(&self, reservation_id: Uuid) -> Result<Reservation> {
    self
      .store
      .get_reservation(reservation_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ReservationNotFound(reservation_id))
  }

  /// Look a reservation up by the confirmation code handed to the driver.
  /// Matching ignores case and surrounding whitespace.
  pub async fn reservation_by_confirmation(&self, confirmation: &str) -> Result<Reservation> {
    let confirmation = confirmation.trim().to_uppercase();
    let found = self
      .store
      .find_reservation_by_confirmation(&confirmation)
      .await
      .map_err(Error::store)?;
    found.ok_or(Error::ConfirmationNotFound(confirmation))
  }

  /// Admit the reserved vehicle: allocate a space (reserved zone first) and
  /// mark the reservation checked in, atomically with the claim.
  pub async fn check_in(&self, reservation_id: Uuid, entry_gate: Option<String>) -> Result<Entry> {
    let now = self.now();
    let reservation = self.get_reservation(reservation_id).await?;
    if reservation.status != ReservationStatus::Confirmed {
      return Err(Error::InvalidState(format!(
        "reservation {reservation_id} is {}",
        reservation.status
      )));
    }
    if now >= reservation.window.end {
      return Err(Error::InvalidState(format!("reservation {reservation_id} window has ended")));
    }

    let vehicle = self.vehicle(reservation.vehicle_id).await?;
    if self
      .store
      .active_session_for_vehicle(vehicle.vehicle_id)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Err(self.already_parked(&vehicle).await);
    }

    let mut zones = vec![reservation.zone_id];
    zones.extend(
      self
        .store
        .list_zones()
        .await
        .map_err(Error::store)?
        .into_iter()
        .map(|z| z.zone_id)
        .filter(|id| *id != reservation.zone_id),
    );

    let session = self
      .assign(AllocationRequest {
        vehicle: vehicle.clone(),
        zones,
        preference: None,
        reservation_id: Some(reservation_id),
        entry_gate,
        at: now,
      })
      .await?;
    info!(
      %reservation_id,
      session_id = %session.session_id,
      vehicle = %vehicle.license_plate,
      "reservation checked in"
    );
    self.entry_for(session).await
  }

  pub async fn cancel_reservation(&self, reservation_id: Uuid) -> Result<Reservation> {
    match self
      .store
      .transition_reservation(
        reservation_id,
        ReservationStatus::Confirmed,
        ReservationStatus::Cancelled,
      )
      .await
      .map_err(Error::store)?
    {
      Transition::Updated(r) => {
        info!(%reservation_id, "reservation cancelled");
        Ok(r)
      }
      Transition::WrongStatus(status) => Err(Error::InvalidState(format!(
        "reservation {reservation_id} is {status}"
      ))),
      Transition::NotFound => Err(Error::ReservationNotFound(reservation_id)),
    }
  }

  /// Close out reservations whose window has ended.
  pub async fn sweep_reservations(&self) -> Result<SweepReport> {
    let report = self.store.sweep_reservations(self.now()).await.map_err(Error::store)?;
    if report.no_shows > 0 || report.expired > 0 {
      info!(no_shows = report.no_shows, expired = report.expired, "reservations swept");
    }
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn t(h: u32, m: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap() }

  #[test]
  fn window_rejects_empty_and_inverted() {
    assert!(matches!(TimeWindow::new(t(9, 0), t(9, 0)), Err(Error::InvalidWindow(_))));
    assert!(matches!(TimeWindow::new(t(10, 0), t(9, 0)), Err(Error::InvalidWindow(_))));
    assert!(TimeWindow::new(t(9, 0), t(9, 1)).is_ok());
  }

  #[test]
  fn adjacent_windows_do_not_overlap() {
    let day = TimeWindow::new(t(9, 0), t(17, 0)).unwrap();
    let evening = TimeWindow::new(t(17, 0), t(18, 0)).unwrap();
    let straddle = TimeWindow::new(t(16, 59), t(18, 0)).unwrap();
    assert!(!day.overlaps(&evening));
    assert!(!evening.overlaps(&day));
    assert!(day.overlaps(&straddle));
    assert!(straddle.overlaps(&evening));
  }

  #[test]
  fn contains_is_half_open() {
    let w = TimeWindow::new(t(9, 0), t(10, 0)).unwrap();
    assert!(w.contains(t(9, 0)));
    assert!(w.contains(t(9, 59)));
    assert!(!w.contains(t(10, 0)));
  }

  #[test]
  fn live_statuses() {
    assert!(ReservationStatus::Confirmed.is_live());
    assert!(ReservationStatus::CheckedIn.is_live());
    assert!(!ReservationStatus::Cancelled.is_live());
    assert!(!ReservationStatus::Expired.is_live());
    assert!(!ReservationStatus::NoShow.is_live());
  }

  #[test]
  fn status_serialises_snake_case() {
    assert_eq!(
      serde_json::to_string(&ReservationStatus::NoShow).unwrap(),
      "\"no_show\""
    );
  }
}
