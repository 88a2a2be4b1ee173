//! The `ParkingStore` trait and the outcome types of its atomic operations.
//!
//! The trait is implemented by storage backends (e.g. `carpark-store-sqlite`).
//! Operations documented as atomic must apply completely or not at all with
//! respect to every other caller; the engine relies on this for its
//! no-double-allocation and no-over-redemption guarantees.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
  availability::ZoneSnapshot,
  discount::{Discount, DiscountRejection, NewDiscount},
  membership::{
    MemberBenefit, Membership, MembershipPlan, MembershipStatus, NewMembership, NewMembershipPlan,
  },
  rate::{NewRate, Rate},
  reservation::{Reservation, ReservationStatus},
  session::{Payment, Session, SessionStatus},
  space::{NewSpace, NewZone, Space, Zone},
  vehicle::{NewVehicle, Vehicle},
};

// ─── Atomic operation inputs and outcomes ────────────────────────────────────

/// Result of [`ParkingStore::claim_space`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
  /// The space was free; it is now occupied by the inserted session.
  Claimed(Session),
  /// Someone else took the space first.
  Lost,
  /// The vehicle already has an active session.
  VehicleBusy,
  /// The session's reservation is no longer `confirmed`.
  ReservationNotConfirmed,
}

/// Input to [`ParkingStore::complete_session`].
#[derive(Debug, Clone)]
pub struct ExitCommit {
  pub session_id:       Uuid,
  pub exit_time:        DateTime<Utc>,
  pub exit_gate:        Option<String>,
  /// Fee computed at `exit_time`; the settled payment must cover it.
  pub fee_due:          Decimal,
  /// Billed hours to add to a membership's accumulator.
  pub membership_hours: Option<(Uuid, Decimal)>,
}

/// Result of [`ParkingStore::complete_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
  Completed(Session),
  PaymentRequired { paid: Decimal },
  NotActive(SessionStatus),
  NotFound,
}

/// Input to [`ParkingStore::settle_payment`].
#[derive(Debug, Clone)]
pub struct Settlement {
  pub payment_id:    Uuid,
  pub session_id:    Uuid,
  pub amount:        Decimal,
  /// Fee the settled payment must cover after this settlement.
  pub fee_due:       Decimal,
  /// Code to validate and redeem in the same transaction.
  pub discount_code: Option<String>,
  pub receipt:       String,
  pub at:            DateTime<Utc>,
}

/// Result of [`ParkingStore::settle_payment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
  Settled(Payment),
  /// An earlier settled payment fell short and was topped up.
  ToppedUp(Payment),
  /// The existing settled payment already covers the fee.
  AlreadySettled(Payment),
  Insufficient { due: Decimal, paid: Decimal },
  DiscountRejected(DiscountRejection),
  NotActive(SessionStatus),
  NotFound,
}

/// Result of single-row status transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<T, S> {
  Updated(T),
  WrongStatus(S),
  NotFound,
}

/// Result of [`ParkingStore::set_maintenance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceOutcome {
  Updated(Space),
  Occupied,
  NotFound,
}

/// Counts from [`ParkingStore::sweep_reservations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
  /// Confirmed reservations whose window ended without a check-in.
  pub no_shows: usize,
  /// Checked-in reservations whose window ended.
  pub expired:  usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a car park store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ParkingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Facility ──────────────────────────────────────────────────────────

  fn add_zone(
    &self,
    input: NewZone,
  ) -> impl Future<Output = Result<Zone, Self::Error>> + Send + '_;

  fn get_zone(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Zone>, Self::Error>> + Send + '_;

  /// All zones, ascending by identity.
  fn list_zones(&self) -> impl Future<Output = Result<Vec<Zone>, Self::Error>> + Send + '_;

  fn add_space(
    &self,
    input: NewSpace,
  ) -> impl Future<Output = Result<Space, Self::Error>> + Send + '_;

  fn get_space(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Space>, Self::Error>> + Send + '_;

  /// Look a space up by its label within a zone.
  fn find_space<'a>(
    &'a self,
    zone_id: Uuid,
    label: &'a str,
  ) -> impl Future<Output = Result<Option<Space>, Self::Error>> + Send + 'a;

  /// Put a space into or out of maintenance. Atomic: refuses occupied spaces.
  fn set_maintenance(
    &self,
    space_id: Uuid,
    on: bool,
  ) -> impl Future<Output = Result<MaintenanceOutcome, Self::Error>> + Send + '_;

  /// Load the availability view of a zone. Returns `None` for unknown zones.
  fn zone_snapshot(
    &self,
    zone_id: Uuid,
  ) -> impl Future<Output = Result<Option<ZoneSnapshot>, Self::Error>> + Send + '_;

  // ── Vehicles ──────────────────────────────────────────────────────────

  fn add_vehicle(
    &self,
    input: NewVehicle,
  ) -> impl Future<Output = Result<Vehicle, Self::Error>> + Send + '_;

  fn get_vehicle(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Vehicle>, Self::Error>> + Send + '_;

  /// Look a vehicle up by its (already normalised) plate.
  fn find_vehicle<'a>(
    &'a self,
    plate: &'a str,
  ) -> impl Future<Output = Result<Option<Vehicle>, Self::Error>> + Send + 'a;

  // ── Pricing ───────────────────────────────────────────────────────────

  fn add_rate(
    &self,
    input: NewRate,
  ) -> impl Future<Output = Result<Rate, Self::Error>> + Send + '_;

  fn list_rates(&self) -> impl Future<Output = Result<Vec<Rate>, Self::Error>> + Send + '_;

  fn add_discount(
    &self,
    input: NewDiscount,
  ) -> impl Future<Output = Result<Discount, Self::Error>> + Send + '_;

  fn get_discount(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Discount>, Self::Error>> + Send + '_;

  /// Look a discount up by its (already normalised) code.
  fn find_discount<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Discount>, Self::Error>> + Send + 'a;

  fn add_plan(
    &self,
    input: NewMembershipPlan,
  ) -> impl Future<Output = Result<MembershipPlan, Self::Error>> + Send + '_;

  fn get_plan(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<MembershipPlan>, Self::Error>> + Send + '_;

  fn add_membership(
    &self,
    input: NewMembership,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// The active membership covering `vehicle_id` on `day`, with its plan.
  fn active_membership(
    &self,
    vehicle_id: Uuid,
    day: NaiveDate,
  ) -> impl Future<Output = Result<Option<MemberBenefit>, Self::Error>> + Send + '_;

  /// A membership with its plan, whatever its status.
  fn get_membership(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<MemberBenefit>, Self::Error>> + Send + '_;

  /// Atomic `active → cancelled`.
  fn cancel_membership(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Transition<Membership, MembershipStatus>, Self::Error>>
  + Send
  + '_;

  /// Atomically replace the membership with [`Membership::renewed`] as of
  /// `today`. Returns `None` for unknown memberships.
  fn renew_membership(
    &self,
    id: Uuid,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Option<Membership>, Self::Error>> + Send + '_;

  /// Active auto-renewing memberships whose term ended before `today`.
  fn lapsed_auto_renewals(
    &self,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Atomically claim `session.space_id` (compare-and-swap on the space
  /// status) and insert `session`. When the session carries a reservation,
  /// that reservation moves `confirmed → checked_in` in the same unit.
  fn claim_space(
    &self,
    session: Session,
  ) -> impl Future<Output = Result<ClaimOutcome, Self::Error>> + Send + '_;

  fn get_session(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  fn find_session_by_ticket<'a>(
    &'a self,
    ticket: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + 'a;

  fn active_session_for_vehicle(
    &self,
    vehicle_id: Uuid,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  /// Atomically verify settlement, complete the session, release its space
  /// and accumulate membership hours.
  fn complete_session(
    &self,
    commit: ExitCommit,
  ) -> impl Future<Output = Result<ExitOutcome, Self::Error>> + Send + '_;

  /// Administrative `active → cancelled`; releases the space.
  fn cancel_session(
    &self,
    session_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Transition<Session, SessionStatus>, Self::Error>> + Send + '_;

  // ── Payments ──────────────────────────────────────────────────────────

  fn settled_payment(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<Payment>, Self::Error>> + Send + '_;

  /// Atomically validate and redeem the discount code, check the amount and
  /// record (or top up) the session's settled payment.
  fn settle_payment(
    &self,
    settlement: Settlement,
  ) -> impl Future<Output = Result<SettleOutcome, Self::Error>> + Send + '_;

  // ── Reservations ──────────────────────────────────────────────────────

  /// Insert `reservation` if `admit` accepts the zone as it stands inside
  /// the same transaction. Returns `None` when `admit` refuses.
  fn book_reservation<F>(
    &self,
    reservation: Reservation,
    admit: F,
  ) -> impl Future<Output = Result<Option<Reservation>, Self::Error>> + Send + '_
  where
    F: FnOnce(&ZoneSnapshot) -> bool + Send + 'static;

  fn get_reservation(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Reservation>, Self::Error>> + Send + '_;

  /// Look a reservation up by its (already normalised) confirmation code.
  fn find_reservation_by_confirmation<'a>(
    &'a self,
    confirmation: &'a str,
  ) -> impl Future<Output = Result<Option<Reservation>, Self::Error>> + Send + 'a;

  /// Move a reservation from `from` to `to`, atomically.
  fn transition_reservation(
    &self,
    id: Uuid,
    from: ReservationStatus,
    to: ReservationStatus,
  ) -> impl Future<Output = Result<Transition<Reservation, ReservationStatus>, Self::Error>>
  + Send
  + '_;

  /// Close out reservations whose window ended at or before `now`.
  fn sweep_reservations(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<SweepReport, Self::Error>> + Send + '_;
}
