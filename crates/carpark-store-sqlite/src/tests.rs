//! Integration tests for `SqliteStore`, driven through `ParkingEngine`
//! against an in-memory database and a manual clock.

use std::sync::Arc;

use carpark_core::{
  Error, ParkingEngine, Policy,
  clock::ManualClock,
  discount::{DiscountKind, DiscountRejection, NewDiscount},
  lifecycle::EntryRequest,
  membership::{MembershipStatus, NewMembership, NewMembershipPlan},
  payment::SettleRequest,
  rate::{GracePolicy, NewRate, PeakPricing, RateKind},
  reservation::{BookingRequest, ReservationStatus},
  session::SessionStatus,
  space::{NewSpace, NewZone, SpaceStatus, SpaceType, Zone},
  store::ParkingStore,
  vehicle::NewVehicle,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::SqliteStore;

fn t(h: u32, m: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap() }

struct Fixture {
  engine: ParkingEngine<SqliteStore>,
  clock:  ManualClock,
  zone:   Zone,
}

async fn fixture_with(spaces: usize, policy: Policy) -> Fixture {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  let clock = ManualClock::new(t(8, 0));
  let engine = ParkingEngine::new(Arc::new(store), Arc::new(clock.clone()), policy);

  let zone = engine
    .register_zone(NewZone { name: "Level 1".into(), level: 1 })
    .await
    .unwrap();
  for i in 0..spaces {
    engine
      .add_space(NewSpace {
        zone_id:    zone.zone_id,
        label:      format!("L1-{i:02}"),
        space_type: SpaceType::Standard,
      })
      .await
      .unwrap();
  }
  engine
    .add_rate(NewRate {
      name:           "Standard hourly".into(),
      zone_id:        None,
      kind:           RateKind::Hourly,
      amount:         Decimal::from(5),
      grace_minutes:  15,
      effective_from: t(0, 0) - TimeDelta::days(1),
      effective_to:   None,
      peak:           None,
    })
    .await
    .unwrap();

  Fixture { engine, clock, zone }
}

async fn fixture(spaces: usize) -> Fixture { fixture_with(spaces, Policy::default()).await }

async fn vehicle(f: &Fixture, plate: &str) {
  f.engine
    .register_vehicle(NewVehicle { license_plate: plate.into(), is_ev: false })
    .await
    .unwrap();
}

async fn ev_vehicle(f: &Fixture, plate: &str) {
  f.engine
    .register_vehicle(NewVehicle { license_plate: plate.into(), is_ev: true })
    .await
    .unwrap();
}

async fn ev_bay(f: &Fixture) {
  f.engine
    .add_space(NewSpace {
      zone_id:    f.zone.zone_id,
      label:      "L1-EV".into(),
      space_type: SpaceType::Ev,
    })
    .await
    .unwrap();
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn entry(plate: &str) -> EntryRequest {
  EntryRequest {
    license_plate: plate.into(),
    entry_gate:    Some("north".into()),
    zone_id:       None,
    space_type:    None,
  }
}

fn pay(session_id: Uuid, amount: i64) -> SettleRequest {
  SettleRequest { session_id, amount: Decimal::from(amount), discount_code: None }
}

fn booking(plate: &str, zone_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> BookingRequest {
  BookingRequest { license_plate: plate.into(), zone_id, start, end }
}

async fn discount(f: &Fixture, code: &str, kind: DiscountKind, value: i64, max_uses: Option<u32>) {
  f.engine
    .add_discount(NewDiscount {
      code: code.into(),
      name: code.into(),
      kind,
      value: Decimal::from(value),
      valid_from: t(0, 0) - TimeDelta::days(1),
      valid_to: t(0, 0) + TimeDelta::days(30),
      max_uses,
    })
    .await
    .unwrap();
}

// ─── Facility ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn zone_snapshot_reflects_spaces() {
  let f = fixture(3).await;
  let snap = f.engine.store().zone_snapshot(f.zone.zone_id).await.unwrap().unwrap();
  assert_eq!(snap.capacity(), 3);
  assert!(snap.occupancy.is_empty());
  assert!(snap.spaces.windows(2).all(|w| w[0].space_id < w[1].space_id));

  let missing = f.engine.store().zone_snapshot(Uuid::now_v7()).await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn plates_are_normalised_and_unique() {
  let f = fixture(1).await;
  vehicle(&f, " abc-123 ").await;
  let found = f.engine.store().find_vehicle("ABC-123").await.unwrap();
  assert!(found.is_some());

  let again = f
    .engine
    .register_vehicle(NewVehicle { license_plate: "Abc-123".into(), is_ev: false })
    .await;
  assert!(matches!(again, Err(Error::AlreadyExists(_))));
}

#[tokio::test]
async fn duplicate_space_label_is_a_conflict() {
  let f = fixture(1).await;
  let err = f
    .engine
    .add_space(NewSpace {
      zone_id:    f.zone.zone_id,
      label:      " L1-00 ".into(),
      space_type: SpaceType::Compact,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::AlreadyExists(_)));
  assert_eq!(err.kind(), carpark_core::ErrorKind::Conflict);

  let other = f
    .engine
    .register_zone(NewZone { name: "Level 2".into(), level: 2 })
    .await
    .unwrap();
  f.engine
    .add_space(NewSpace { zone_id: other.zone_id, label: "L1-00".into(), space_type: SpaceType::Standard })
    .await
    .unwrap();
}

#[tokio::test]
async fn duplicate_discount_code_is_a_conflict() {
  let f = fixture(1).await;
  discount(&f, "SUMMER", DiscountKind::Percentage, 10, None).await;
  let err = f
    .engine
    .add_discount(NewDiscount {
      code:       " summer ".into(),
      name:       "again".into(),
      kind:       DiscountKind::FixedAmount,
      value:      Decimal::ONE,
      valid_from: t(0, 0),
      valid_to:   t(23, 0),
      max_uses:   None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::AlreadyExists(_)));
}

#[tokio::test]
async fn maintenance_refuses_occupied_spaces() {
  let f = fixture(2).await;
  vehicle(&f, "AAA111").await;
  let parked = f.engine.enter(entry("AAA111")).await.unwrap();

  let err = f.engine.set_maintenance(parked.space.space_id, true).await.unwrap_err();
  assert!(matches!(err, Error::SpaceOccupied(_)));

  let spaces = f.engine.list_spaces(f.zone.zone_id).await.unwrap();
  let free = spaces.iter().find(|s| s.space_id != parked.space.space_id).unwrap();
  let updated = f.engine.set_maintenance(free.space_id, true).await.unwrap();
  assert_eq!(updated.status, SpaceStatus::Maintenance);

  vehicle(&f, "BBB222").await;
  let err = f.engine.enter(entry("BBB222")).await.unwrap_err();
  assert!(matches!(err, Error::NoSpaceAvailable));

  f.engine.set_maintenance(free.space_id, false).await.unwrap();
  f.engine.enter(entry("BBB222")).await.unwrap();
}

// ─── Entry ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn entry_claims_a_space_and_issues_a_ticket() {
  let f = fixture(2).await;
  vehicle(&f, "AAA111").await;

  let e = f.engine.enter(entry("aaa111")).await.unwrap();
  assert!(e.ticket.starts_with("TKT-"));
  assert_eq!(e.session.status, SessionStatus::Active);
  assert_eq!(e.session.entry_time, t(8, 0));
  assert_eq!(e.space.status, SpaceStatus::Occupied);

  let stored = f.engine.store().get_space(e.space.space_id).await.unwrap().unwrap();
  assert_eq!(stored.status, SpaceStatus::Occupied);
}

#[tokio::test]
async fn entry_rejects_unknown_and_parked_vehicles() {
  let f = fixture(2).await;
  let err = f.engine.enter(entry("NOPE")).await.unwrap_err();
  assert!(matches!(err, Error::VehicleNotFound(_)));

  vehicle(&f, "AAA111").await;
  let first = f.engine.enter(entry("AAA111")).await.unwrap();
  match f.engine.enter(entry("AAA111")).await.unwrap_err() {
    Error::VehicleAlreadyParked { ticket, .. } => assert_eq!(ticket, first.ticket),
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_never_share_a_space() {
  let f = fixture(3).await;
  let plates = ["C1", "C2", "C3", "C4"];
  for p in plates {
    vehicle(&f, p).await;
  }

  let handles: Vec<_> = plates
    .iter()
    .map(|p| {
      let engine = f.engine.clone();
      let req = entry(p);
      tokio::spawn(async move { engine.enter(req).await })
    })
    .collect();

  let mut spaces = Vec::new();
  let mut refused = 0;
  for h in handles {
    match h.await.unwrap() {
      Ok(e) => spaces.push(e.space.space_id),
      Err(Error::NoSpaceAvailable) => refused += 1,
      Err(other) => panic!("unexpected error: {other}"),
    }
  }
  assert_eq!(spaces.len(), 3);
  assert_eq!(refused, 1);
  spaces.sort();
  spaces.dedup();
  assert_eq!(spaces.len(), 3, "a space was allocated twice");
}

// ─── Fees & exit ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn fee_follows_grace_and_hour_rounding() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();

  f.clock.advance(TimeDelta::minutes(15));
  assert_eq!(f.engine.calculate_fee(e.session.session_id, None).await.unwrap().total, Decimal::ZERO);

  f.clock.set(t(9, 1));
  let q = f.engine.calculate_fee(e.session.session_id, None).await.unwrap();
  assert_eq!(q.duration_minutes, 61);
  assert_eq!(q.total, Decimal::from(5));
  assert_eq!(q.tax, Decimal::ZERO);

  f.clock.set(t(10, 7));
  let q = f.engine.calculate_fee(e.session.session_id, None).await.unwrap();
  assert_eq!(q.total, Decimal::from(10));
}

#[tokio::test]
async fn waive_policy_bills_the_whole_stay() {
  let policy = Policy { grace_policy: GracePolicy::Waive, ..Policy::default() };
  let f = fixture_with(1, policy).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();

  f.clock.set(t(10, 7));
  let q = f.engine.calculate_fee(e.session.session_id, None).await.unwrap();
  assert_eq!(q.total, Decimal::from(15));
}

#[tokio::test]
async fn peak_surcharge_follows_the_time_of_pricing() {
  let f = fixture(1).await;
  let hm = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
  f.engine
    .add_rate(NewRate {
      name:           "Level 1 peak".into(),
      zone_id:        Some(f.zone.zone_id),
      kind:           RateKind::Hourly,
      amount:         Decimal::from(5),
      grace_minutes:  15,
      effective_from: t(0, 0),
      effective_to:   None,
      peak:           Some(PeakPricing { start: hm(8), end: hm(10), multiplier: Decimal::TWO }),
    })
    .await
    .unwrap();
  let stored = f.engine.list_rates().await.unwrap();
  assert!(stored.iter().any(|r| r.peak.is_some_and(|p| p.multiplier == Decimal::TWO)));

  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();

  f.clock.set(t(9, 1));
  let q = f.engine.calculate_fee(e.session.session_id, None).await.unwrap();
  assert_eq!(q.base_fee, Decimal::from(10));
  assert_eq!(q.total, Decimal::from(10));
  assert_eq!(q.breakdown[1].description, "Peak hour surcharge (100%)");
  assert_eq!(q.breakdown[1].amount, Decimal::from(5));

  f.clock.set(t(10, 7));
  let q = f.engine.calculate_fee(e.session.session_id, None).await.unwrap();
  assert_eq!(q.total, Decimal::from(10));
  assert_eq!(q.breakdown.len(), 1);
}

#[tokio::test]
async fn peak_pricing_is_validated() {
  let f = fixture(1).await;
  let hm = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
  let rate = |kind: RateKind, multiplier: Decimal| NewRate {
    name: "bad".into(),
    zone_id: None,
    kind,
    amount: Decimal::from(5),
    grace_minutes: 0,
    effective_from: t(0, 0),
    effective_to: None,
    peak: Some(PeakPricing { start: hm(17), end: hm(19), multiplier }),
  };

  let err = f.engine.add_rate(rate(RateKind::Hourly, Decimal::new(5, 1))).await.unwrap_err();
  assert!(matches!(err, Error::InvalidRate(_)));
  let err = f.engine.add_rate(rate(RateKind::Daily, Decimal::TWO)).await.unwrap_err();
  assert!(matches!(err, Error::InvalidRate(_)));
}

#[tokio::test]
async fn clock_going_backwards_is_invalid_state() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();

  f.clock.set(t(7, 0));
  let err = f.engine.calculate_fee(e.session.session_id, None).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn exit_is_gated_on_payment_and_happens_once() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();
  f.clock.set(t(9, 1));

  match f.engine.exit(&e.ticket, Some("south".into())).await.unwrap_err() {
    Error::PaymentRequired { due, paid } => {
      assert_eq!(due, Decimal::from(5));
      assert_eq!(paid, Decimal::ZERO);
    }
    other => panic!("unexpected error: {other}"),
  }

  let receipt = f.engine.settle_payment(pay(e.session.session_id, 5)).await.unwrap();
  assert!(receipt.payment.receipt.starts_with("RCP-"));
  assert!(!receipt.top_up);

  let out = f.engine.exit(&e.ticket, Some("south".into())).await.unwrap();
  assert_eq!(out.session.status, SessionStatus::Completed);
  assert_eq!(out.session.exit_time, Some(t(9, 1)));
  assert_eq!(out.session.exit_gate.as_deref(), Some("south"));

  let again = f.engine.exit(&e.ticket, None).await.unwrap_err();
  assert!(matches!(again, Error::InvalidState(_)));

  let space = f.engine.store().get_space(e.space.space_id).await.unwrap().unwrap();
  assert_eq!(space.status, SpaceStatus::Available);
}

#[tokio::test]
async fn exit_within_grace_needs_no_payment() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();
  f.clock.advance(TimeDelta::minutes(10));

  let out = f.engine.exit(&e.ticket, None).await.unwrap();
  assert_eq!(out.fee.total, Decimal::ZERO);
}

#[tokio::test]
async fn overstay_after_payment_needs_a_top_up() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();

  f.clock.set(t(9, 1));
  f.engine.settle_payment(pay(e.session.session_id, 5)).await.unwrap();
  let err = f.engine.settle_payment(pay(e.session.session_id, 5)).await.unwrap_err();
  assert!(matches!(err, Error::AlreadySettled(_)));

  f.clock.set(t(10, 10));
  match f.engine.exit(&e.ticket, None).await.unwrap_err() {
    Error::PaymentRequired { due, paid } => {
      assert_eq!(due, Decimal::from(10));
      assert_eq!(paid, Decimal::from(5));
    }
    other => panic!("unexpected error: {other}"),
  }

  let short = f.engine.settle_payment(pay(e.session.session_id, 2)).await.unwrap_err();
  assert!(matches!(short, Error::PaymentRequired { .. }));

  let topped = f.engine.settle_payment(pay(e.session.session_id, 5)).await.unwrap();
  assert!(topped.top_up);
  assert_eq!(topped.payment.amount, Decimal::from(10));
  f.engine.exit(&e.ticket, None).await.unwrap();
}

#[tokio::test]
async fn validate_exit_reports_time_until_next_step() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();
  f.clock.set(t(9, 1));

  let before = f.engine.validate_exit(&e.ticket).await.unwrap();
  assert!(!before.is_paid);
  assert!(!before.can_exit);
  assert_eq!(before.amount_due, Decimal::from(5));
  assert_eq!(before.time_remaining_minutes, None);

  f.engine.settle_payment(pay(e.session.session_id, 5)).await.unwrap();
  let after = f.engine.validate_exit(&e.ticket).await.unwrap();
  assert!(after.is_paid);
  assert!(after.can_exit);
  assert_eq!(after.amount_due, Decimal::ZERO);
  // Second hour starts after 15m grace + 60m.
  assert_eq!(after.time_remaining_minutes, Some(14));
}

#[tokio::test]
async fn cancelled_session_releases_its_space() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();

  let cancelled = f
    .engine
    .cancel_session(e.session.session_id, Some("gate fault"))
    .await
    .unwrap();
  assert_eq!(cancelled.status, SessionStatus::Cancelled);
  assert!(cancelled.exit_time.is_some());

  let err = f.engine.cancel_session(e.session.session_id, None).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));

  vehicle(&f, "BBB222").await;
  f.engine.enter(entry("BBB222")).await.unwrap();
}

// ─── Discounts & memberships ─────────────────────────────────────────────────

#[tokio::test]
async fn discount_is_quoted_then_redeemed_at_settlement() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  discount(&f, "save20", DiscountKind::Percentage, 20, Some(5)).await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();
  f.clock.set(t(9, 1));

  let q = f.engine.calculate_fee(e.session.session_id, Some("SAVE20")).await.unwrap();
  assert_eq!(q.base_fee, Decimal::from(5));
  assert_eq!(q.total, Decimal::from(4));
  let untouched = f.engine.store().find_discount("SAVE20").await.unwrap().unwrap();
  assert_eq!(untouched.uses, 0);

  let receipt = f
    .engine
    .settle_payment(SettleRequest {
      session_id:    e.session.session_id,
      amount:        Decimal::from(4),
      discount_code: Some("save20".into()),
    })
    .await
    .unwrap();
  assert_eq!(receipt.payment.discount_id, Some(untouched.discount_id));
  let used = f.engine.store().find_discount("SAVE20").await.unwrap().unwrap();
  assert_eq!(used.uses, 1);

  // The redeemed discount keeps applying at exit.
  let out = f.engine.exit(&e.ticket, None).await.unwrap();
  assert_eq!(out.fee.total, Decimal::from(4));
}

#[tokio::test]
async fn unknown_code_is_rejected_not_dropped() {
  let f = fixture(1).await;
  vehicle(&f, "AAA111").await;
  let e = f.engine.enter(entry("AAA111")).await.unwrap();

  match f.engine.calculate_fee(e.session.session_id, Some("BOGUS")).await.unwrap_err() {
    Error::DiscountInvalid { code, reason } => {
      assert_eq!(code, "BOGUS");
      assert_eq!(reason, DiscountRejection::Unknown);
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capped_discount_is_redeemed_once_under_contention() {
  let f = fixture(2).await;
  discount(&f, "ONCE", DiscountKind::FixedAmount, 1, Some(1)).await;
  vehicle(&f, "AAA111").await;
  vehicle(&f, "BBB222").await;
  let a = f.engine.enter(entry("AAA111")).await.unwrap();
  let b = f.engine.enter(entry("BBB222")).await.unwrap();
  f.clock.set(t(9, 1));

  let handles: Vec<_> = [a.session.session_id, b.session.session_id]
    .into_iter()
    .map(|session_id| {
      let engine = f.engine.clone();
      tokio::spawn(async move {
        engine
          .settle_payment(SettleRequest {
            session_id,
            amount: Decimal::from(5),
            discount_code: Some("ONCE".into()),
          })
          .await
      })
    })
    .collect();

  let mut ok = 0;
  let mut rejected = 0;
  for h in handles {
    match h.await.unwrap() {
      Ok(_) => ok += 1,
      Err(Error::DiscountInvalid { reason: DiscountRejection::Exhausted, .. }) => rejected += 1,
      Err(other) => panic!("unexpected error: {other}"),
    }
  }
  assert_eq!((ok, rejected), (1, 1));
  let d = f.engine.store().find_discount("ONCE").await.unwrap().unwrap();
  assert_eq!(d.uses, 1);
}

#[tokio::test]
async fn membership_discounts_and_accumulates_hours() {
  let f = fixture(1).await;
  let v = f
    .engine
    .register_vehicle(NewVehicle { license_plate: "MEM1".into(), is_ev: false })
    .await
    .unwrap();
  let plan = f
    .engine
    .add_plan(NewMembershipPlan {
      name:             "Commuter".into(),
      discount_percent: Decimal::from(10),
      included_hours:   None,
      duration_months:  1,
    })
    .await
    .unwrap();
  let membership = f
    .engine
    .enroll_membership(NewMembership {
      plan_id:     plan.plan_id,
      vehicle_ids: vec![v.vehicle_id],
      valid_from:  t(0, 0).date_naive(),
      valid_to:    t(0, 0).date_naive() + TimeDelta::days(30),
      auto_renew:  false,
    })
    .await
    .unwrap();

  let e = f.engine.enter(entry("MEM1")).await.unwrap();
  f.clock.set(t(10, 7));
  let q = f.engine.calculate_fee(e.session.session_id, None).await.unwrap();
  assert_eq!(q.total, Decimal::new(900, 2));

  f.engine
    .settle_payment(SettleRequest {
      session_id:    e.session.session_id,
      amount:        Decimal::new(900, 2),
      discount_code: None,
    })
    .await
    .unwrap();
  f.engine.exit(&e.ticket, None).await.unwrap();

  let benefit = f
    .engine
    .store()
    .active_membership(v.vehicle_id, t(10, 7).date_naive())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(benefit.membership.membership_id, membership.membership_id);
  assert_eq!(benefit.membership.hours_used, Decimal::from(2));
}

async fn member(f: &Fixture, plate: &str, from: NaiveDate, to: NaiveDate, auto_renew: bool) -> Uuid {
  let v = f
    .engine
    .register_vehicle(NewVehicle { license_plate: plate.into(), is_ev: false })
    .await
    .unwrap();
  let plan = f
    .engine
    .add_plan(NewMembershipPlan {
      name:             format!("{plate} plan"),
      discount_percent: Decimal::ZERO,
      included_hours:   Some(10),
      duration_months:  1,
    })
    .await
    .unwrap();
  f.engine
    .enroll_membership(NewMembership {
      plan_id: plan.plan_id,
      vehicle_ids: vec![v.vehicle_id],
      valid_from: from,
      valid_to: to,
      auto_renew,
    })
    .await
    .unwrap()
    .membership_id
}

#[tokio::test]
async fn membership_cancel_renew_and_usage() {
  let f = fixture(1).await;
  let id = member(&f, "MEM1", date(2025, 6, 1), date(2025, 6, 30), false).await;

  let usage = f.engine.membership_usage(id).await.unwrap();
  assert_eq!(usage.included_hours, Some(10));
  assert_eq!(usage.remaining_hours, Some(Decimal::from(10)));
  assert_eq!(usage.days_remaining, 28);

  let cancelled = f.engine.cancel_membership(id).await.unwrap();
  assert_eq!(cancelled.status, MembershipStatus::Cancelled);
  let again = f.engine.cancel_membership(id).await.unwrap_err();
  assert!(matches!(again, Error::InvalidState(_)));

  let vehicle_id = cancelled.vehicle_ids[0];
  let covered = f.engine.store().active_membership(vehicle_id, date(2025, 6, 2)).await.unwrap();
  assert!(covered.is_none());

  let restarted = f.engine.renew_membership(id).await.unwrap();
  assert_eq!(restarted.status, MembershipStatus::Active);
  assert_eq!((restarted.valid_from, restarted.valid_to), (date(2025, 6, 2), date(2025, 7, 2)));

  let extended = f.engine.renew_membership(id).await.unwrap();
  assert_eq!((extended.valid_from, extended.valid_to), (date(2025, 6, 2), date(2025, 8, 2)));
  let stored = f.engine.get_membership(id).await.unwrap();
  assert_eq!(stored.membership, extended);

  let missing = f.engine.renew_membership(Uuid::now_v7()).await.unwrap_err();
  assert!(matches!(missing, Error::MembershipNotFound(_)));
}

#[tokio::test]
async fn only_auto_renewing_lapsed_memberships_are_renewed() {
  let f = fixture(1).await;
  let auto = member(&f, "AUTO1", date(2025, 5, 1), date(2025, 5, 31), true).await;
  let manual = member(&f, "MANUAL1", date(2025, 5, 1), date(2025, 5, 31), false).await;
  let current = member(&f, "CURRENT1", date(2025, 6, 1), date(2025, 6, 30), true).await;

  assert_eq!(f.engine.renew_lapsed_memberships().await.unwrap(), 1);

  let renewed = f.engine.get_membership(auto).await.unwrap().membership;
  assert_eq!((renewed.valid_from, renewed.valid_to), (date(2025, 6, 2), date(2025, 7, 2)));
  let untouched = f.engine.get_membership(manual).await.unwrap().membership;
  assert_eq!(untouched.valid_to, date(2025, 5, 31));
  let running = f.engine.get_membership(current).await.unwrap().membership;
  assert_eq!(running.valid_to, date(2025, 6, 30));

  assert_eq!(f.engine.renew_lapsed_memberships().await.unwrap(), 0);
}

// ─── Reservations ────────────────────────────────────────────────────────────

#[tokio::test]
async fn adjacent_reservations_share_the_last_space() {
  let f = fixture(1).await;
  vehicle(&f, "R1").await;
  vehicle(&f, "R2").await;
  vehicle(&f, "R3").await;
  let zone_id = f.zone.zone_id;

  let day = f.engine.book_reservation(booking("R1", zone_id, t(9, 0), t(17, 0))).await.unwrap();
  assert!(day.confirmation.starts_with("RSV-"));
  assert_eq!(day.status, ReservationStatus::Confirmed);

  f.engine.book_reservation(booking("R2", zone_id, t(17, 0), t(18, 0))).await.unwrap();

  let err = f
    .engine
    .book_reservation(booking("R3", zone_id, t(16, 59), t(18, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::WindowConflict(_)));

  let avail = f.engine.check_availability(zone_id, t(12, 0), t(13, 0)).await.unwrap();
  assert_eq!((avail.capacity, avail.free), (1, 0));
}

#[tokio::test]
async fn reservation_windows_are_validated() {
  let f = fixture(1).await;
  vehicle(&f, "R1").await;
  let zone_id = f.zone.zone_id;

  for (start, end) in [
    (t(10, 0), t(10, 0)),
    (t(11, 0), t(10, 0)),
    (t(6, 0), t(7, 0)),
    (t(9, 0) + TimeDelta::days(31), t(10, 0) + TimeDelta::days(31)),
  ] {
    let err = f.engine.book_reservation(booking("R1", zone_id, start, end)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidWindow(_)), "{start}..{end}: {err}");
  }

  let err = f
    .engine
    .book_reservation(booking("R1", Uuid::now_v7(), t(9, 0), t(10, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ZoneNotFound(_)));
}

#[tokio::test]
async fn walk_in_sessions_count_against_near_bookings() {
  let f = fixture(1).await;
  vehicle(&f, "WALK").await;
  vehicle(&f, "R1").await;
  f.engine.enter(entry("WALK")).await.unwrap();

  let err = f
    .engine
    .book_reservation(booking("R1", f.zone.zone_id, t(9, 0), t(10, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::WindowConflict(_)));

  // Beyond the projection horizon the walk-in is assumed gone.
  let later = t(9, 0) + TimeDelta::days(2);
  f.engine
    .book_reservation(booking("R1", f.zone.zone_id, later, later + TimeDelta::hours(1)))
    .await
    .unwrap();
}

#[tokio::test]
async fn held_space_goes_to_the_reservation_holder() {
  let f = fixture(1).await;
  vehicle(&f, "R1").await;
  vehicle(&f, "WALK").await;
  let r = f
    .engine
    .book_reservation(booking("R1", f.zone.zone_id, t(9, 0), t(17, 0)))
    .await
    .unwrap();

  f.clock.set(t(9, 5));
  let err = f.engine.enter(entry("WALK")).await.unwrap_err();
  assert!(matches!(err, Error::NoSpaceAvailable));

  let statuses = f.engine.list_spaces(f.zone.zone_id).await.unwrap();
  assert_eq!(statuses[0].status, SpaceStatus::Reserved);

  let e = f.engine.check_in(r.reservation_id, Some("east".into())).await.unwrap();
  assert_eq!(e.session.reservation_id, Some(r.reservation_id));
  let stored = f.engine.get_reservation(r.reservation_id).await.unwrap();
  assert_eq!(stored.status, ReservationStatus::CheckedIn);

  let again = f.engine.check_in(r.reservation_id, None).await.unwrap_err();
  assert!(matches!(again, Error::InvalidState(_)));
}

#[tokio::test]
async fn standard_hold_is_not_given_away_when_an_ev_bay_is_free() {
  let f = fixture(1).await;
  ev_bay(&f).await;
  vehicle(&f, "R1").await;
  vehicle(&f, "WALK").await;
  ev_vehicle(&f, "SPARK").await;
  let r = f
    .engine
    .book_reservation(booking("R1", f.zone.zone_id, t(9, 0), t(17, 0)))
    .await
    .unwrap();

  f.clock.set(t(9, 5));
  let err = f.engine.enter(entry("WALK")).await.unwrap_err();
  assert!(matches!(err, Error::NoSpaceAvailable));

  let spark = f.engine.enter(entry("SPARK")).await.unwrap();
  assert_eq!(spark.space.space_type, SpaceType::Ev);

  let e = f.engine.check_in(r.reservation_id, None).await.unwrap();
  assert_eq!(e.space.space_type, SpaceType::Standard);
}

#[tokio::test]
async fn ev_bays_do_not_count_for_non_ev_bookings() {
  let f = fixture(1).await;
  ev_bay(&f).await;
  vehicle(&f, "R1").await;
  vehicle(&f, "R2").await;
  ev_vehicle(&f, "SPARK").await;
  let zone_id = f.zone.zone_id;

  f.engine.book_reservation(booking("R1", zone_id, t(9, 0), t(17, 0))).await.unwrap();

  let avail = f.engine.check_availability(zone_id, t(10, 0), t(12, 0)).await.unwrap();
  assert_eq!((avail.capacity, avail.free, avail.free_standard), (2, 1, 0));

  let err = f
    .engine
    .book_reservation(booking("R2", zone_id, t(10, 0), t(12, 0)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::WindowConflict(_)));

  f.engine.book_reservation(booking("SPARK", zone_id, t(10, 0), t(12, 0))).await.unwrap();
}

#[tokio::test]
async fn reservation_is_found_by_confirmation() {
  let f = fixture(1).await;
  vehicle(&f, "R1").await;
  let r = f
    .engine
    .book_reservation(booking("R1", f.zone.zone_id, t(9, 0), t(10, 0)))
    .await
    .unwrap();

  let code = format!(" {} ", r.confirmation.to_lowercase());
  let found = f.engine.reservation_by_confirmation(&code).await.unwrap();
  assert_eq!(found, r);

  let err = f.engine.reservation_by_confirmation("RSV-00000000").await.unwrap_err();
  assert!(matches!(err, Error::ConfirmationNotFound(_)));
}

#[tokio::test]
async fn check_in_after_window_is_refused() {
  let f = fixture(1).await;
  vehicle(&f, "R1").await;
  let r = f
    .engine
    .book_reservation(booking("R1", f.zone.zone_id, t(9, 0), t(10, 0)))
    .await
    .unwrap();

  f.clock.set(t(10, 0));
  let err = f.engine.check_in(r.reservation_id, None).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn cancelled_reservation_frees_capacity() {
  let f = fixture(1).await;
  vehicle(&f, "R1").await;
  vehicle(&f, "R2").await;
  let r = f
    .engine
    .book_reservation(booking("R1", f.zone.zone_id, t(9, 0), t(17, 0)))
    .await
    .unwrap();

  let cancelled = f.engine.cancel_reservation(r.reservation_id).await.unwrap();
  assert_eq!(cancelled.status, ReservationStatus::Cancelled);
  let err = f.engine.cancel_reservation(r.reservation_id).await.unwrap_err();
  assert!(matches!(err, Error::InvalidState(_)));

  f.engine
    .book_reservation(booking("R2", f.zone.zone_id, t(10, 0), t(11, 0)))
    .await
    .unwrap();
}

#[tokio::test]
async fn sweep_marks_no_shows_and_expires_checked_in() {
  let f = fixture(2).await;
  vehicle(&f, "R1").await;
  vehicle(&f, "R2").await;
  let missed = f
    .engine
    .book_reservation(booking("R1", f.zone.zone_id, t(9, 0), t(10, 0)))
    .await
    .unwrap();
  let kept = f
    .engine
    .book_reservation(booking("R2", f.zone.zone_id, t(9, 0), t(10, 0)))
    .await
    .unwrap();

  f.clock.set(t(9, 30));
  f.engine.check_in(kept.reservation_id, None).await.unwrap();

  f.clock.set(t(10, 0));
  let report = f.engine.sweep_reservations().await.unwrap();
  assert_eq!((report.no_shows, report.expired), (1, 1));

  let missed = f.engine.get_reservation(missed.reservation_id).await.unwrap();
  assert_eq!(missed.status, ReservationStatus::NoShow);
  let kept = f.engine.get_reservation(kept.reservation_id).await.unwrap();
  assert_eq!(kept.status, ReservationStatus::Expired);
}
