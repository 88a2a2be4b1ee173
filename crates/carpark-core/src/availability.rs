//! The availability index: a point-in-time view of one zone.
//!
//! A [`ZoneSnapshot`] is loaded from persisted spaces, active sessions and
//! live reservations, either for a read or inside the transaction that is
//! about to mutate them. Nothing here is cached between calls.
//!
//! EV bays only take EVs, so every count is split by class: a non-EV
//! reservation can only be honoured from a non-EV bay, while an EV
//! reservation can be honoured from any bay.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  reservation::{Reservation, ReservationStatus, TimeWindow},
  space::{Space, SpaceStatus, SpaceType, Zone},
};

/// An active session's hold on a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occupancy {
  pub session_id:     Uuid,
  pub space_id:       Uuid,
  pub reservation_id: Option<Uuid>,
}

/// Pending holds at one instant, by the class of the reserved vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Holds {
  pub standard: usize,
  pub ev:       usize,
}

impl Holds {
  pub fn total(&self) -> usize { self.standard + self.ev }
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneSnapshot {
  pub zone:            Zone,
  /// Sorted by ascending identity.
  pub spaces:          Vec<Space>,
  pub occupancy:       Vec<Occupancy>,
  /// Only `confirmed` and `checked_in` reservations.
  pub reservations:    Vec<Reservation>,
  /// Reservations in `reservations` made for an EV.
  pub ev_reservations: Vec<Uuid>,
}

impl ZoneSnapshot {
  pub fn new(
    zone: Zone,
    mut spaces: Vec<Space>,
    occupancy: Vec<Occupancy>,
    mut reservations: Vec<Reservation>,
  ) -> Self {
    spaces.sort_by_key(|s| s.space_id);
    reservations.retain(|r| r.status.is_live());
    Self { zone, spaces, occupancy, reservations, ev_reservations: Vec::new() }
  }

  /// Mark the given reservations as made for EVs.
  pub fn with_ev_reservations(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
    self.ev_reservations = ids.into_iter().collect();
    self
  }

  fn is_ev_reservation(&self, r: &Reservation) -> bool {
    self.ev_reservations.contains(&r.reservation_id)
  }

  fn is_ev_bay(space: &Space) -> bool { space.space_type == SpaceType::Ev }

  /// Spaces that can take a vehicle at all.
  pub fn capacity(&self) -> usize {
    self.spaces.iter().filter(|s| s.status != SpaceStatus::Maintenance).count()
  }

  /// Spaces that can take a non-EV vehicle.
  pub fn standard_capacity(&self) -> usize {
    self
      .spaces
      .iter()
      .filter(|s| s.status != SpaceStatus::Maintenance && !Self::is_ev_bay(s))
      .count()
  }

  fn is_occupied(&self, space: &Space) -> bool {
    space.status == SpaceStatus::Occupied
      || self.occupancy.iter().any(|o| o.space_id == space.space_id)
  }

  fn free_spaces(&self) -> impl Iterator<Item = &Space> {
    self
      .spaces
      .iter()
      .filter(|s| s.status != SpaceStatus::Maintenance && !self.is_occupied(s))
  }

  /// Confirmed reservations whose window contains `at` and whose vehicle has
  /// not arrived yet, split by vehicle class.
  pub fn pending_holds(&self, at: DateTime<Utc>, except: Option<Uuid>) -> Holds {
    self
      .reservations
      .iter()
      .filter(|r| r.status == ReservationStatus::Confirmed)
      .filter(|r| Some(r.reservation_id) != except)
      .filter(|r| r.window.contains(at))
      .fold(Holds::default(), |mut holds, r| {
        if self.is_ev_reservation(r) {
          holds.ev += 1;
        } else {
          holds.standard += 1;
        }
        holds
      })
  }

  /// Total pending holds at `at`; each one keeps a free space back.
  pub fn holds_at(&self, at: DateTime<Utc>, except: Option<Uuid>) -> usize {
    self.pending_holds(at, except).total()
  }

  /// Free spaces an immediate entry at `as_of` may take, ascending by
  /// identity.
  ///
  /// Holds are counted, not pinned. Non-EV holds must stay satisfiable from
  /// free non-EV bays and all holds from free bays overall, except the hold
  /// of `except`. A non-EV vehicle is never offered an EV bay.
  pub fn find_free(
    &self,
    is_ev: bool,
    space_type: Option<SpaceType>,
    as_of: DateTime<Utc>,
    except: Option<Uuid>,
  ) -> Vec<Uuid> {
    let holds = self.pending_holds(as_of, except);
    let (ev_free, std_free) = self.free_spaces().fold((0usize, 0usize), |(ev, std), s| {
      if Self::is_ev_bay(s) { (ev + 1, std) } else { (ev, std + 1) }
    });
    let slack = (ev_free + std_free).saturating_sub(holds.total());
    let std_usable = std_free.saturating_sub(holds.standard).min(slack);
    let ev_usable = if is_ev { ev_free.min(slack) } else { 0 };

    let (mut std_taken, mut ev_taken) = (0usize, 0usize);
    let mut out = Vec::new();
    for s in self.free_spaces().filter(|s| space_type.is_none_or(|t| s.space_type == t)) {
      let (taken, usable) = if Self::is_ev_bay(s) {
        (&mut ev_taken, ev_usable)
      } else {
        (&mut std_taken, std_usable)
      };
      if *taken < usable {
        *taken += 1;
        out.push(s.space_id);
      }
    }
    out
  }

  /// Whether any live reservation overlaps `window` (half-open).
  pub fn intervals_overlap(&self, window: &TimeWindow) -> bool {
    self.reservations.iter().any(|r| r.window.overlaps(window))
  }

  /// Largest number of live reservations in force at any instant of `window`.
  pub fn peak_reserved(&self, window: &TimeWindow) -> usize { self.peak_where(window, |_| true) }

  fn peak_where(&self, window: &TimeWindow, keep: impl Fn(&Reservation) -> bool) -> usize {
    let mut events: Vec<(DateTime<Utc>, i32)> = Vec::new();
    for r in self.reservations.iter().filter(|r| r.window.overlaps(window) && keep(r)) {
      events.push((r.window.start.max(window.start), 1));
      events.push((r.window.end.min(window.end), -1));
    }
    // Ends sort before starts at the same instant: `[a, b)` and `[b, c)` never
    // coexist.
    events.sort();

    let (mut running, mut peak) = (0i32, 0i32);
    for (_, delta) in events {
      running += delta;
      peak = peak.max(running);
    }
    usize::try_from(peak).unwrap_or(0)
  }

  /// Active sessions not already counted through a live reservation of this
  /// zone.
  pub fn walk_in_sessions(&self) -> usize { self.uncounted_sessions(|_| true, |_| true) }

  /// Active sessions on bays matching `bay` that no live reservation matching
  /// `counted` accounts for.
  fn uncounted_sessions(
    &self,
    bay: impl Fn(&Space) -> bool,
    counted: impl Fn(&Reservation) -> bool,
  ) -> usize {
    self
      .occupancy
      .iter()
      .filter(|o| {
        self
          .spaces
          .iter()
          .find(|s| s.space_id == o.space_id)
          .is_none_or(&bay)
      })
      .filter(|o| {
        o.reservation_id.is_none_or(|id| {
          !self
            .reservations
            .iter()
            .any(|r| r.reservation_id == id && counted(r))
        })
      })
      .count()
  }

  /// Spaces left over `window` for a new booking by a vehicle of the given
  /// class.
  ///
  /// Walk-in sessions are assumed to still be parked at the window start when
  /// it begins within `projection` of `now`. A non-EV booking must also fit
  /// into the non-EV bays alongside the other non-EV bookings.
  pub fn free_capacity(
    &self,
    window: &TimeWindow,
    now: DateTime<Utc>,
    projection: TimeDelta,
    is_ev: bool,
  ) -> usize {
    let near = window.start < now + projection;
    let projected = if near { self.walk_in_sessions() } else { 0 };
    let overall = self
      .capacity()
      .saturating_sub(self.peak_reserved(window) + projected);
    if is_ev {
      return overall;
    }

    let projected_std = if near {
      self.uncounted_sessions(|s| !Self::is_ev_bay(s), |r| !self.is_ev_reservation(r))
    } else {
      0
    };
    let standard = self
      .standard_capacity()
      .saturating_sub(self.peak_where(window, |r| !self.is_ev_reservation(r)) + projected_std);
    overall.min(standard)
  }

  /// Spaces with their status as seen at `as_of`.
  ///
  /// Held-back spaces are reported as reserved. Non-EV holds take the tail of
  /// the free non-EV bays; EV holds take the tail of the free EV bays, then
  /// whatever non-EV bays remain.
  pub fn space_statuses(&self, as_of: DateTime<Utc>) -> Vec<Space> {
    let holds = self.pending_holds(as_of, None);
    let (ev_free, std_free): (Vec<&Space>, Vec<&Space>) =
      self.free_spaces().partition(|s| Self::is_ev_bay(s));

    let ev_held = holds.ev.min(ev_free.len());
    let held: Vec<Uuid> = std_free
      .iter()
      .rev()
      .take(holds.standard + (holds.ev - ev_held))
      .chain(ev_free.iter().rev().take(ev_held))
      .map(|s| s.space_id)
      .collect();

    self
      .spaces
      .iter()
      .map(|s| {
        let status = if s.status == SpaceStatus::Maintenance {
          SpaceStatus::Maintenance
        } else if self.is_occupied(s) {
          SpaceStatus::Occupied
        } else if held.contains(&s.space_id) {
          SpaceStatus::Reserved
        } else {
          SpaceStatus::Available
        };
        Space { status, ..s.clone() }
      })
      .collect()
  }
}
