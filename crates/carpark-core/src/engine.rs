//! [`ParkingEngine`]: the entry point that ties a store, a clock and the
//! pricing policy together.
//!
//! The session, allocation, payment and reservation operations live in their
//! own modules as further `impl` blocks on this type. This module holds the
//! policy knobs and the administrative operations that populate a facility.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  clock::Clock,
  discount::{Discount, NewDiscount, normalize_code},
  membership::{
    MemberBenefit, Membership, MembershipPlan, MembershipUsage, NewMembership, NewMembershipPlan,
  },
  rate::{GracePolicy, NewRate, Rate, RateEngine, RateKind, select_rate},
  space::{NewSpace, NewZone, Space, Zone},
  store::{MaintenanceOutcome, ParkingStore, Transition},
  vehicle::{NewVehicle, Vehicle, normalize_plate},
};

/// Tunables read from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Policy {
  pub grace_policy:               GracePolicy,
  /// Upper bound on compare-and-swap claims per entry.
  pub max_claim_attempts:         u32,
  pub max_reservation_days_ahead: i64,
  /// How far ahead walk-in sessions are assumed to still be parked when a
  /// booking is checked for capacity.
  pub session_projection_hours:   i64,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      grace_policy:               GracePolicy::Subtract,
      max_claim_attempts:         8,
      max_reservation_days_ahead: 30,
      session_projection_hours:   24,
    }
  }
}

impl Policy {
  pub(crate) fn projection(&self) -> TimeDelta {
    TimeDelta::hours(self.session_projection_hours)
  }
}

pub struct ParkingEngine<S> {
  pub(crate) store:  Arc<S>,
  pub(crate) clock:  Arc<dyn Clock>,
  pub(crate) policy: Policy,
  pub(crate) rates:  RateEngine,
}

impl<S> Clone for ParkingEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      clock:  Arc::clone(&self.clock),
      policy: self.policy.clone(),
      rates:  self.rates,
    }
  }
}

impl<S: ParkingStore> ParkingEngine<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: Policy) -> Self {
    let rates = RateEngine::new(policy.grace_policy);
    Self { store, clock, policy, rates }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn policy(&self) -> &Policy { &self.policy }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  // ─── Lookups shared by the other modules ──────────────────────────────────

  pub(crate) async fn zone(&self, zone_id: Uuid) -> Result<Zone> {
    self
      .store
      .get_zone(zone_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ZoneNotFound(zone_id))
  }

  pub(crate) async fn vehicle_by_plate(&self, plate: &str) -> Result<Vehicle> {
    let plate = normalize_plate(plate);
    let found = self.store.find_vehicle(&plate).await.map_err(Error::store)?;
    found.ok_or(Error::VehicleNotFound(plate))
  }

  pub(crate) async fn vehicle(&self, vehicle_id: Uuid) -> Result<Vehicle> {
    self
      .store
      .get_vehicle(vehicle_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::VehicleNotFound(vehicle_id.to_string()))
  }

  /// The rate in force for `zone_id` at `at`.
  pub(crate) async fn rate_for(&self, zone_id: Uuid, at: DateTime<Utc>) -> Result<Rate> {
    let rates = self.store.list_rates().await.map_err(Error::store)?;
    select_rate(&rates, zone_id, at)
      .cloned()
      .ok_or_else(|| Error::InvalidRate(format!("no rate in force for zone {zone_id} at {at}")))
  }

  // ─── Administration ───────────────────────────────────────────────────────

  pub async fn register_zone(&self, input: NewZone) -> Result<Zone> {
    if input.name.trim().is_empty() {
      return Err(Error::InvalidInput("zone name must not be empty".into()));
    }
    let zone = self.store.add_zone(input).await.map_err(Error::store)?;
    info!(zone_id = %zone.zone_id, name = %zone.name, "zone registered");
    Ok(zone)
  }

  pub async fn list_zones(&self) -> Result<Vec<Zone>> {
    self.store.list_zones().await.map_err(Error::store)
  }

  pub async fn add_space(&self, input: NewSpace) -> Result<Space> {
    if input.label.trim().is_empty() {
      return Err(Error::InvalidInput("space label must not be empty".into()));
    }
    self.zone(input.zone_id).await?;
    let label = input.label.trim().to_owned();
    if self
      .store
      .find_space(input.zone_id, &label)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Err(Error::AlreadyExists(format!("space {label} in zone {}", input.zone_id)));
    }
    let space = self
      .store
      .add_space(NewSpace { label, ..input })
      .await
      .map_err(Error::store)?;
    info!(space_id = %space.space_id, label = %space.label, "space added");
    Ok(space)
  }

  pub async fn list_spaces(&self, zone_id: Uuid) -> Result<Vec<Space>> {
    let snapshot = self
      .store
      .zone_snapshot(zone_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ZoneNotFound(zone_id))?;
    Ok(snapshot.space_statuses(self.now()))
  }

  /// Take a space out of service, or return it. Occupied spaces are refused.
  pub async fn set_maintenance(&self, space_id: Uuid, on: bool) -> Result<Space> {
    match self.store.set_maintenance(space_id, on).await.map_err(Error::store)? {
      MaintenanceOutcome::Updated(space) => {
        info!(%space_id, maintenance = on, "space maintenance changed");
        Ok(space)
      }
      MaintenanceOutcome::Occupied => Err(Error::SpaceOccupied(space_id)),
      MaintenanceOutcome::NotFound => Err(Error::SpaceNotFound(space_id)),
    }
  }

  pub async fn register_vehicle(&self, input: NewVehicle) -> Result<Vehicle> {
    let license_plate = normalize_plate(&input.license_plate);
    if license_plate.is_empty() {
      return Err(Error::InvalidInput("license plate must not be empty".into()));
    }
    if self.store.find_vehicle(&license_plate).await.map_err(Error::store)?.is_some() {
      return Err(Error::AlreadyExists(format!("vehicle {license_plate}")));
    }
    self
      .store
      .add_vehicle(NewVehicle { license_plate, ..input })
      .await
      .map_err(Error::store)
  }

  pub async fn add_rate(&self, input: NewRate) -> Result<Rate> {
    if input.amount < Decimal::ZERO {
      return Err(Error::InvalidRate("amount must not be negative".into()));
    }
    if input.effective_to.is_some_and(|to| to < input.effective_from) {
      return Err(Error::InvalidRate("effective_to precedes effective_from".into()));
    }
    if input.peak.is_some_and(|p| p.multiplier < Decimal::ONE) {
      return Err(Error::InvalidRate("peak multiplier must be at least 1".into()));
    }
    if input.peak.is_some() && input.kind != RateKind::Hourly {
      return Err(Error::InvalidRate("peak pricing only applies to hourly rates".into()));
    }
    if let Some(zone_id) = input.zone_id {
      self.zone(zone_id).await?;
    }
    let rate = self.store.add_rate(input).await.map_err(Error::store)?;
    info!(rate_id = %rate.rate_id, kind = ?rate.kind, amount = %rate.amount, "rate added");
    Ok(rate)
  }

  pub async fn list_rates(&self) -> Result<Vec<Rate>> {
    self.store.list_rates().await.map_err(Error::store)
  }

  pub async fn add_discount(&self, input: NewDiscount) -> Result<Discount> {
    let code = normalize_code(&input.code);
    if code.is_empty() {
      return Err(Error::InvalidInput("discount code must not be empty".into()));
    }
    if input.value < Decimal::ZERO {
      return Err(Error::InvalidInput("discount value must not be negative".into()));
    }
    if input.valid_to < input.valid_from {
      return Err(Error::InvalidInput("discount validity window is inverted".into()));
    }
    if self.store.find_discount(&code).await.map_err(Error::store)?.is_some() {
      return Err(Error::AlreadyExists(format!("discount code {code}")));
    }
    self
      .store
      .add_discount(NewDiscount { code, ..input })
      .await
      .map_err(Error::store)
  }

  pub async fn add_plan(&self, input: NewMembershipPlan) -> Result<MembershipPlan> {
    if input.discount_percent < Decimal::ZERO || input.discount_percent > Decimal::from(100) {
      return Err(Error::InvalidInput("plan discount must be between 0 and 100".into()));
    }
    if input.duration_months == 0 {
      return Err(Error::InvalidInput("plan term must be at least one month".into()));
    }
    self.store.add_plan(input).await.map_err(Error::store)
  }

  pub async fn enroll_membership(&self, input: NewMembership) -> Result<Membership> {
    if input.valid_to < input.valid_from {
      return Err(Error::InvalidInput("membership validity window is inverted".into()));
    }
    if input.vehicle_ids.is_empty() {
      return Err(Error::InvalidInput("membership needs at least one vehicle".into()));
    }
    self
      .store
      .get_plan(input.plan_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::PlanNotFound(input.plan_id))?;
    for &vehicle_id in &input.vehicle_ids {
      self.vehicle(vehicle_id).await?;
    }
    self.store.add_membership(input).await.map_err(Error::store)
  }

  // ─── Memberships ──────────────────────────────────────────────────────────

  pub async fn get_membership(&self, membership_id: Uuid) -> Result<MemberBenefit> {
    self
      .store
      .get_membership(membership_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::MembershipNotFound(membership_id))
  }

  pub async fn membership_usage(&self, membership_id: Uuid) -> Result<MembershipUsage> {
    let benefit = self.get_membership(membership_id).await?;
    Ok(benefit.usage(self.now().date_naive()))
  }

  /// `active → cancelled`. The membership stops applying immediately.
  pub async fn cancel_membership(&self, membership_id: Uuid) -> Result<Membership> {
    match self.store.cancel_membership(membership_id).await.map_err(Error::store)? {
      Transition::Updated(m) => {
        info!(%membership_id, "membership cancelled");
        Ok(m)
      }
      Transition::WrongStatus(status) => {
        Err(Error::InvalidState(format!("membership {membership_id} is {status}")))
      }
      Transition::NotFound => Err(Error::MembershipNotFound(membership_id)),
    }
  }

  /// Extend a membership by one term of its plan; see [`Membership::renewed`].
  pub async fn renew_membership(&self, membership_id: Uuid) -> Result<Membership> {
    let today = self.now().date_naive();
    let renewed = self
      .store
      .renew_membership(membership_id, today)
      .await
      .map_err(Error::store)?
      .ok_or(Error::MembershipNotFound(membership_id))?;
    info!(%membership_id, valid_to = %renewed.valid_to, "membership renewed");
    Ok(renewed)
  }

  /// Renew every auto-renewing membership whose term has ended. Returns how
  /// many were renewed.
  pub async fn renew_lapsed_memberships(&self) -> Result<usize> {
    let today = self.now().date_naive();
    let lapsed = self.store.lapsed_auto_renewals(today).await.map_err(Error::store)?;
    for &membership_id in &lapsed {
      self.renew_membership(membership_id).await?;
    }
    Ok(lapsed.len())
  }
}
