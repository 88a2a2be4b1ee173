//! [`SqliteStore`]: the SQLite implementation of [`ParkingStore`].

use std::path::Path;

use carpark_core::{
  availability::{Occupancy, ZoneSnapshot},
  discount::{Discount, DiscountRejection, NewDiscount},
  membership::{
    MemberBenefit, Membership, MembershipPlan, MembershipStatus, NewMembership, NewMembershipPlan,
  },
  rate::{NewRate, Rate},
  reservation::{Reservation, ReservationStatus},
  session::{Payment, Session, SessionStatus},
  space::{NewSpace, NewZone, Space, SpaceStatus, Zone},
  store::{
    ClaimOutcome, ExitCommit, ExitOutcome, MaintenanceOutcome, ParkingStore, SettleOutcome,
    Settlement, SweepReport, Transition,
  },
  vehicle::{NewVehicle, Vehicle},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, params};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawDiscount, RawMembership, RawPayment, RawPlan, RawRate, RawReservation, RawSession,
    RawSpace, RawVehicle, RawZone, decode_decimal, decode_opt_uuid, decode_uuid, encode_date,
    encode_decimal, encode_discount_kind, encode_dt, encode_membership_status, encode_rate_kind,
    encode_reservation_status, encode_session_status, encode_space_status, encode_space_type,
    encode_time, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A car park store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .run(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
  }

  /// Run `f` on the connection in autocommit mode.
  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    Ok(self.conn.call(move |conn| f(conn).map_err(Error::into_call)).await?)
  }

  /// Run `f` inside a `BEGIN IMMEDIATE` transaction. `f` must commit; an
  /// early return drops the transaction and rolls it back.
  async fn transact<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    Ok(
      self
        .conn
        .call(move |conn| {
          let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
          f(tx).map_err(Error::into_call)
        })
        .await?,
    )
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn fetch_one<R, F>(conn: &rusqlite::Connection, sql: &str, key: &str, map: F) -> Result<Option<R>>
where
  F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
{
  Ok(conn.query_row(sql, params![key], map).optional()?)
}

fn fetch_all<R, P, F>(conn: &rusqlite::Connection, sql: &str, args: P, map: F) -> Result<Vec<R>>
where
  P: rusqlite::Params,
  F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
{
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt.query_map(args, map)?.collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn zone_row(conn: &rusqlite::Connection, zone_id: &str) -> Result<Option<Zone>> {
  let sql = format!("SELECT {} FROM zones WHERE zone_id = ?1", RawZone::COLUMNS);
  fetch_one(conn, &sql, zone_id, RawZone::from_row)?.map(RawZone::into_zone).transpose()
}

fn space_row(conn: &rusqlite::Connection, space_id: &str) -> Result<Option<Space>> {
  let sql = format!("SELECT {} FROM spaces WHERE space_id = ?1", RawSpace::COLUMNS);
  fetch_one(conn, &sql, space_id, RawSpace::from_row)?.map(RawSpace::into_space).transpose()
}

fn vehicle_row(conn: &rusqlite::Connection, column: &str, key: &str) -> Result<Option<Vehicle>> {
  let sql = format!("SELECT {} FROM vehicles WHERE {column} = ?1", RawVehicle::COLUMNS);
  fetch_one(conn, &sql, key, RawVehicle::from_row)?.map(RawVehicle::into_vehicle).transpose()
}

fn discount_row(conn: &rusqlite::Connection, column: &str, key: &str) -> Result<Option<Discount>> {
  let sql = format!("SELECT {} FROM discounts WHERE {column} = ?1", RawDiscount::COLUMNS);
  fetch_one(conn, &sql, key, RawDiscount::from_row)?
    .map(RawDiscount::into_discount)
    .transpose()
}

/// The first session matching `filter`, a `WHERE` clause over `?1`.
fn session_row(conn: &rusqlite::Connection, filter: &str, key: &str) -> Result<Option<Session>> {
  let sql = format!("SELECT {} FROM sessions WHERE {filter} LIMIT 1", RawSession::COLUMNS);
  fetch_one(conn, &sql, key, RawSession::from_row)?.map(RawSession::into_session).transpose()
}

fn settled_payment_row(conn: &rusqlite::Connection, session_id: &str) -> Result<Option<Payment>> {
  let sql = format!(
    "SELECT {} FROM payments WHERE session_id = ?1 AND settled = 1",
    RawPayment::COLUMNS
  );
  fetch_one(conn, &sql, session_id, RawPayment::from_row)?
    .map(RawPayment::into_payment)
    .transpose()
}

fn reservation_row(
  conn: &rusqlite::Connection,
  column: &str,
  key: &str,
) -> Result<Option<Reservation>> {
  let sql = format!("SELECT {} FROM reservations WHERE {column} = ?1", RawReservation::COLUMNS);
  fetch_one(conn, &sql, key, RawReservation::from_row)?
    .map(RawReservation::into_reservation)
    .transpose()
}

fn membership_vehicles(conn: &rusqlite::Connection, membership_id: &str) -> Result<Vec<Uuid>> {
  fetch_all(
    conn,
    "SELECT vehicle_id FROM membership_vehicles WHERE membership_id = ?1 ORDER BY vehicle_id",
    params![membership_id],
    |row| row.get::<_, String>(0),
  )?
  .iter()
  .map(|s| decode_uuid(s))
  .collect()
}

/// The first membership matching `filter` (a `WHERE` clause over `m` and
/// `p`), with its plan.
fn benefit_row<P: rusqlite::Params>(
  conn: &rusqlite::Connection,
  filter: &str,
  args: P,
) -> Result<Option<MemberBenefit>> {
  let sql = format!(
    "SELECT {}, {}
     FROM memberships m
     JOIN membership_plans p ON p.plan_id = m.plan_id
     WHERE {filter}
     ORDER BY m.membership_id DESC
     LIMIT 1",
    RawMembership::COLUMNS,
    RawPlan::JOINED_COLUMNS,
  );
  let raw = conn
    .query_row(&sql, args, |row| {
      Ok((RawMembership::from_row(row)?, RawPlan::from_row_at(row, RawMembership::WIDTH)?))
    })
    .optional()?;

  let Some((raw_membership, raw_plan)) = raw else {
    return Ok(None);
  };
  let vehicles = membership_vehicles(conn, &raw_membership.membership_id)?;
  Ok(Some(MemberBenefit {
    membership: raw_membership.into_membership(vehicles)?,
    plan:       raw_plan.into_plan()?,
  }))
}

/// Assemble the availability view of one zone.
fn load_snapshot(conn: &rusqlite::Connection, zone_id: Uuid) -> Result<Option<ZoneSnapshot>> {
  let zid = encode_uuid(zone_id);
  let Some(zone) = zone_row(conn, &zid)? else {
    return Ok(None);
  };

  let spaces = fetch_all(
    conn,
    &format!("SELECT {} FROM spaces WHERE zone_id = ?1 ORDER BY space_id", RawSpace::COLUMNS),
    params![zid],
    RawSpace::from_row,
  )?
  .into_iter()
  .map(RawSpace::into_space)
  .collect::<Result<Vec<_>>>()?;

  let occupancy = fetch_all(
    conn,
    "SELECT session_id, space_id, reservation_id FROM sessions
     WHERE zone_id = ?1 AND status = 'active'",
    params![zid],
    |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<String>>(2)?,
      ))
    },
  )?
  .into_iter()
  .map(|(session_id, space_id, reservation_id)| {
    Ok(Occupancy {
      session_id:     decode_uuid(&session_id)?,
      space_id:       decode_uuid(&space_id)?,
      reservation_id: decode_opt_uuid(reservation_id)?,
    })
  })
  .collect::<Result<Vec<_>>>()?;

  let reservations = fetch_all(
    conn,
    &format!(
      "SELECT {} FROM reservations
       WHERE zone_id = ?1 AND status IN ('confirmed', 'checked_in')",
      RawReservation::COLUMNS
    ),
    params![zid],
    RawReservation::from_row,
  )?
  .into_iter()
  .map(RawReservation::into_reservation)
  .collect::<Result<Vec<_>>>()?;

  let ev_reservations = fetch_all(
    conn,
    "SELECT r.reservation_id FROM reservations r
     JOIN vehicles v ON v.vehicle_id = r.vehicle_id
     WHERE r.zone_id = ?1 AND r.status IN ('confirmed', 'checked_in') AND v.is_ev = 1",
    params![zid],
    |row| row.get::<_, String>(0),
  )?
  .iter()
  .map(|s| decode_uuid(s))
  .collect::<Result<Vec<_>>>()?;

  Ok(Some(
    ZoneSnapshot::new(zone, spaces, occupancy, reservations).with_ev_reservations(ev_reservations),
  ))
}

/// Free the session's space, and retire the reservation it checked in with.
fn release(conn: &rusqlite::Connection, session: &Session) -> Result<()> {
  conn.execute(
    "UPDATE spaces SET status = 'available' WHERE space_id = ?1 AND status = 'occupied'",
    params![encode_uuid(session.space_id)],
  )?;
  if let Some(reservation_id) = session.reservation_id {
    conn.execute(
      "UPDATE reservations SET status = 'expired'
       WHERE reservation_id = ?1 AND status = 'checked_in'",
      params![encode_uuid(reservation_id)],
    )?;
  }
  Ok(())
}

// ─── ParkingStore impl ───────────────────────────────────────────────────────

impl ParkingStore for SqliteStore {
  type Error = Error;

  // ── Facility ──────────────────────────────────────────────────────────────

  async fn add_zone(&self, input: NewZone) -> Result<Zone> {
    let zone = Zone {
      zone_id:    Uuid::now_v7(),
      name:       input.name,
      level:      input.level,
      created_at: Utc::now(),
    };

    let id_str = encode_uuid(zone.zone_id);
    let name   = zone.name.clone();
    let level  = zone.level;
    let at_str = encode_dt(zone.created_at);

    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO zones (zone_id, name, level, created_at) VALUES (?1, ?2, ?3, ?4)",
          params![id_str, name, level, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(zone)
  }

  async fn get_zone(&self, id: Uuid) -> Result<Option<Zone>> {
    let id_str = encode_uuid(id);
    self.run(move |conn| zone_row(conn, &id_str)).await
  }

  async fn list_zones(&self) -> Result<Vec<Zone>> {
    self
      .run(|conn| {
        fetch_all(
          conn,
          &format!("SELECT {} FROM zones ORDER BY zone_id", RawZone::COLUMNS),
          [],
          RawZone::from_row,
        )?
        .into_iter()
        .map(RawZone::into_zone)
        .collect()
      })
      .await
  }

  async fn add_space(&self, input: NewSpace) -> Result<Space> {
    let space = Space {
      space_id:   Uuid::now_v7(),
      zone_id:    input.zone_id,
      label:      input.label,
      space_type: input.space_type,
      status:     SpaceStatus::Available,
    };

    let id_str   = encode_uuid(space.space_id);
    let zone_str = encode_uuid(space.zone_id);
    let label    = space.label.clone();
    let type_str = encode_space_type(space.space_type);

    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO spaces (space_id, zone_id, label, space_type, status)
           VALUES (?1, ?2, ?3, ?4, 'available')",
          params![id_str, zone_str, label, type_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(space)
  }

  async fn get_space(&self, id: Uuid) -> Result<Option<Space>> {
    let id_str = encode_uuid(id);
    self.run(move |conn| space_row(conn, &id_str)).await
  }

  async fn find_space<'a>(&'a self, zone_id: Uuid, label: &'a str) -> Result<Option<Space>> {
    let zone_str = encode_uuid(zone_id);
    let label = label.to_owned();
    self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM spaces WHERE zone_id = ?1 AND label = ?2",
          RawSpace::COLUMNS
        );
        conn
          .query_row(&sql, params![zone_str, label], RawSpace::from_row)
          .optional()?
          .map(RawSpace::into_space)
          .transpose()
      })
      .await
  }

  async fn set_maintenance(&self, space_id: Uuid, on: bool) -> Result<MaintenanceOutcome> {
    let id_str = encode_uuid(space_id);

    self
      .transact(move |tx| {
        let Some(space) = space_row(&tx, &id_str)? else {
          return Ok(MaintenanceOutcome::NotFound);
        };
        let next = match (on, space.status) {
          (true, SpaceStatus::Occupied) => return Ok(MaintenanceOutcome::Occupied),
          (true, _) => SpaceStatus::Maintenance,
          (false, SpaceStatus::Maintenance) => SpaceStatus::Available,
          (false, current) => current,
        };
        tx.execute(
          "UPDATE spaces SET status = ?2 WHERE space_id = ?1",
          params![id_str, encode_space_status(next)],
        )?;
        tx.commit()?;
        Ok(MaintenanceOutcome::Updated(Space { status: next, ..space }))
      })
      .await
  }

  async fn zone_snapshot(&self, zone_id: Uuid) -> Result<Option<ZoneSnapshot>> {
    self.run(move |conn| load_snapshot(conn, zone_id)).await
  }

  // ── Vehicles ──────────────────────────────────────────────────────────────

  async fn add_vehicle(&self, input: NewVehicle) -> Result<Vehicle> {
    let vehicle = Vehicle {
      vehicle_id:    Uuid::now_v7(),
      license_plate: input.license_plate,
      is_ev:         input.is_ev,
      created_at:    Utc::now(),
    };

    let id_str = encode_uuid(vehicle.vehicle_id);
    let plate  = vehicle.license_plate.clone();
    let is_ev  = vehicle.is_ev;
    let at_str = encode_dt(vehicle.created_at);

    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO vehicles (vehicle_id, license_plate, is_ev, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![id_str, plate, is_ev, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(vehicle)
  }

  async fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>> {
    let id_str = encode_uuid(id);
    self.run(move |conn| vehicle_row(conn, "vehicle_id", &id_str)).await
  }

  async fn find_vehicle<'a>(&'a self, plate: &'a str) -> Result<Option<Vehicle>> {
    let plate = plate.to_owned();
    self.run(move |conn| vehicle_row(conn, "license_plate", &plate)).await
  }

  // ── Pricing ───────────────────────────────────────────────────────────────

  async fn add_rate(&self, input: NewRate) -> Result<Rate> {
    let rate = Rate {
      rate_id:        Uuid::now_v7(),
      name:           input.name,
      zone_id:        input.zone_id,
      kind:           input.kind,
      amount:         input.amount,
      grace_minutes:  input.grace_minutes,
      effective_from: input.effective_from,
      effective_to:   input.effective_to,
      active:         true,
      peak:           input.peak,
    };

    let id_str   = encode_uuid(rate.rate_id);
    let name     = rate.name.clone();
    let zone_str = rate.zone_id.map(encode_uuid);
    let kind_str = encode_rate_kind(rate.kind);
    let amount   = encode_decimal(rate.amount);
    let grace    = rate.grace_minutes;
    let from_str = encode_dt(rate.effective_from);
    let to_str   = rate.effective_to.map(encode_dt);
    let peak_start      = rate.peak.map(|p| encode_time(p.start));
    let peak_end        = rate.peak.map(|p| encode_time(p.end));
    let peak_multiplier = rate.peak.map(|p| encode_decimal(p.multiplier));

    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO rates (
             rate_id, name, zone_id, kind, amount, grace_minutes,
             effective_from, effective_to, active, peak_start, peak_end, peak_multiplier
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11)",
          params![
            id_str,
            name,
            zone_str,
            kind_str,
            amount,
            grace,
            from_str,
            to_str,
            peak_start,
            peak_end,
            peak_multiplier,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(rate)
  }

  async fn list_rates(&self) -> Result<Vec<Rate>> {
    self
      .run(|conn| {
        fetch_all(
          conn,
          &format!("SELECT {} FROM rates ORDER BY rate_id", RawRate::COLUMNS),
          [],
          RawRate::from_row,
        )?
        .into_iter()
        .map(RawRate::into_rate)
        .collect()
      })
      .await
  }

  async fn add_discount(&self, input: NewDiscount) -> Result<Discount> {
    let discount = Discount {
      discount_id: Uuid::now_v7(),
      code:        input.code,
      name:        input.name,
      kind:        input.kind,
      value:       input.value,
      valid_from:  input.valid_from,
      valid_to:    input.valid_to,
      max_uses:    input.max_uses,
      uses:        0,
      active:      true,
    };

    let id_str   = encode_uuid(discount.discount_id);
    let code     = discount.code.clone();
    let name     = discount.name.clone();
    let kind_str = encode_discount_kind(discount.kind);
    let value    = encode_decimal(discount.value);
    let from_str = encode_dt(discount.valid_from);
    let to_str   = encode_dt(discount.valid_to);
    let max_uses = discount.max_uses;

    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO discounts (
             discount_id, code, name, kind, value, valid_from, valid_to, max_uses, uses, active
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 1)",
          params![id_str, code, name, kind_str, value, from_str, to_str, max_uses],
        )?;
        Ok(())
      })
      .await?;

    Ok(discount)
  }

  async fn get_discount(&self, id: Uuid) -> Result<Option<Discount>> {
    let id_str = encode_uuid(id);
    self.run(move |conn| discount_row(conn, "discount_id", &id_str)).await
  }

  async fn find_discount<'a>(&'a self, code: &'a str) -> Result<Option<Discount>> {
    let code = code.to_owned();
    self.run(move |conn| discount_row(conn, "code", &code)).await
  }

  async fn add_plan(&self, input: NewMembershipPlan) -> Result<MembershipPlan> {
    let plan = MembershipPlan {
      plan_id:          Uuid::now_v7(),
      name:             input.name,
      discount_percent: input.discount_percent,
      included_hours:   input.included_hours,
      duration_months:  input.duration_months,
      active:           true,
    };

    let id_str   = encode_uuid(plan.plan_id);
    let name     = plan.name.clone();
    let percent  = encode_decimal(plan.discount_percent);
    let included = plan.included_hours;
    let months   = plan.duration_months;

    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO membership_plans (
             plan_id, name, discount_percent, included_hours, duration_months, active
           ) VALUES (?1, ?2, ?3, ?4, ?5, 1)",
          params![id_str, name, percent, included, months],
        )?;
        Ok(())
      })
      .await?;

    Ok(plan)
  }

  async fn get_plan(&self, id: Uuid) -> Result<Option<MembershipPlan>> {
    let id_str = encode_uuid(id);
    self
      .run(move |conn| {
        let sql = format!("SELECT {} FROM membership_plans WHERE plan_id = ?1", RawPlan::COLUMNS);
        fetch_one(conn, &sql, &id_str, |row| RawPlan::from_row_at(row, 0))?
          .map(RawPlan::into_plan)
          .transpose()
      })
      .await
  }

  async fn add_membership(&self, input: NewMembership) -> Result<Membership> {
    let mut vehicle_ids = input.vehicle_ids;
    vehicle_ids.sort();
    vehicle_ids.dedup();

    let membership = Membership {
      membership_id: Uuid::now_v7(),
      plan_id: input.plan_id,
      vehicle_ids,
      hours_used: Decimal::ZERO,
      valid_from: input.valid_from,
      valid_to: input.valid_to,
      status: MembershipStatus::Active,
      auto_renew: input.auto_renew,
    };

    let id_str    = encode_uuid(membership.membership_id);
    let plan_str  = encode_uuid(membership.plan_id);
    let vehicles  = membership.vehicle_ids.iter().copied().map(encode_uuid).collect::<Vec<_>>();
    let from_str  = encode_date(membership.valid_from);
    let to_str    = encode_date(membership.valid_to);
    let renew     = membership.auto_renew;

    self
      .transact(move |tx| {
        tx.execute(
          "INSERT INTO memberships (
             membership_id, plan_id, hours_used, valid_from, valid_to, status, auto_renew
           ) VALUES (?1, ?2, '0', ?3, ?4, 'active', ?5)",
          params![id_str, plan_str, from_str, to_str, renew],
        )?;
        for vehicle in &vehicles {
          tx.execute(
            "INSERT INTO membership_vehicles (membership_id, vehicle_id) VALUES (?1, ?2)",
            params![id_str, vehicle],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(membership)
  }

  async fn active_membership(&self, vehicle_id: Uuid, day: NaiveDate) -> Result<Option<MemberBenefit>> {
    let vehicle_str = encode_uuid(vehicle_id);
    let day_str     = encode_date(day);

    self
      .run(move |conn| {
        benefit_row(
          conn,
          "m.membership_id IN (
             SELECT membership_id FROM membership_vehicles WHERE vehicle_id = ?1
           )
           AND m.status = 'active'
           AND m.valid_from <= ?2
           AND m.valid_to   >= ?2
           AND p.active = 1",
          params![vehicle_str, day_str],
        )
      })
      .await
  }

  async fn get_membership(&self, id: Uuid) -> Result<Option<MemberBenefit>> {
    let id_str = encode_uuid(id);
    self
      .run(move |conn| benefit_row(conn, "m.membership_id = ?1", params![id_str]))
      .await
  }

  async fn cancel_membership(&self, id: Uuid) -> Result<Transition<Membership, MembershipStatus>> {
    let id_str = encode_uuid(id);

    self
      .transact(move |tx| {
        let Some(benefit) = benefit_row(&tx, "m.membership_id = ?1", params![id_str])? else {
          return Ok(Transition::NotFound);
        };
        let membership = benefit.membership;
        if membership.status != MembershipStatus::Active {
          return Ok(Transition::WrongStatus(membership.status));
        }
        tx.execute(
          "UPDATE memberships SET status = ?2 WHERE membership_id = ?1",
          params![id_str, encode_membership_status(MembershipStatus::Cancelled)],
        )?;
        tx.commit()?;
        Ok(Transition::Updated(Membership { status: MembershipStatus::Cancelled, ..membership }))
      })
      .await
  }

  async fn renew_membership(&self, id: Uuid, today: NaiveDate) -> Result<Option<Membership>> {
    let id_str = encode_uuid(id);

    self
      .transact(move |tx| {
        let Some(benefit) = benefit_row(&tx, "m.membership_id = ?1", params![id_str])? else {
          return Ok(None);
        };
        let renewed = benefit.membership.renewed(&benefit.plan, today);
        tx.execute(
          "UPDATE memberships
           SET valid_from = ?2, valid_to = ?3, hours_used = ?4, status = ?5
           WHERE membership_id = ?1",
          params![
            id_str,
            encode_date(renewed.valid_from),
            encode_date(renewed.valid_to),
            encode_decimal(renewed.hours_used),
            encode_membership_status(renewed.status),
          ],
        )?;
        tx.commit()?;
        Ok(Some(renewed))
      })
      .await
  }

  async fn lapsed_auto_renewals(&self, today: NaiveDate) -> Result<Vec<Uuid>> {
    let day_str = encode_date(today);
    self
      .run(move |conn| {
        fetch_all(
          conn,
          "SELECT membership_id FROM memberships
           WHERE auto_renew = 1 AND status = 'active' AND valid_to < ?1
           ORDER BY membership_id",
          params![day_str],
          |row| row.get::<_, String>(0),
        )?
        .iter()
        .map(|s| decode_uuid(s))
        .collect()
      })
      .await
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn claim_space(&self, session: Session) -> Result<ClaimOutcome> {
    self
      .transact(move |tx| {
        let vehicle_str = encode_uuid(session.vehicle_id);
        let space_str   = encode_uuid(session.space_id);

        let busy = tx
          .query_row(
            "SELECT 1 FROM sessions WHERE vehicle_id = ?1 AND status = 'active'",
            params![vehicle_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if busy {
          return Ok(ClaimOutcome::VehicleBusy);
        }

        // Compare-and-swap: only a free space can be claimed.
        let claimed = tx.execute(
          "UPDATE spaces SET status = 'occupied' WHERE space_id = ?1 AND status = 'available'",
          params![space_str],
        )?;
        if claimed == 0 {
          return Ok(ClaimOutcome::Lost);
        }

        if let Some(reservation_id) = session.reservation_id {
          let moved = tx.execute(
            "UPDATE reservations SET status = 'checked_in'
             WHERE reservation_id = ?1 AND status = 'confirmed'",
            params![encode_uuid(reservation_id)],
          )?;
          if moved == 0 {
            return Ok(ClaimOutcome::ReservationNotConfirmed);
          }
        }

        tx.execute(
          "INSERT INTO sessions (
             session_id, vehicle_id, zone_id, space_id, reservation_id, ticket,
             entry_time, entry_gate, exit_time, exit_gate, status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, ?9)",
          params![
            encode_uuid(session.session_id),
            vehicle_str,
            encode_uuid(session.zone_id),
            space_str,
            session.reservation_id.map(encode_uuid),
            session.ticket,
            encode_dt(session.entry_time),
            session.entry_gate,
            encode_session_status(session.status),
          ],
        )?;
        tx.commit()?;
        Ok(ClaimOutcome::Claimed(session))
      })
      .await
  }

  async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
    let id_str = encode_uuid(id);
    self.run(move |conn| session_row(conn, "session_id = ?1", &id_str)).await
  }

  async fn find_session_by_ticket<'a>(&'a self, ticket: &'a str) -> Result<Option<Session>> {
    let ticket = ticket.to_owned();
    self.run(move |conn| session_row(conn, "ticket = ?1", &ticket)).await
  }

  async fn active_session_for_vehicle(&self, vehicle_id: Uuid) -> Result<Option<Session>> {
    let id_str = encode_uuid(vehicle_id);
    self
      .run(move |conn| session_row(conn, "vehicle_id = ?1 AND status = 'active'", &id_str))
      .await
  }

  async fn complete_session(&self, commit: ExitCommit) -> Result<ExitOutcome> {
    self
      .transact(move |tx| {
        let id_str = encode_uuid(commit.session_id);
        let Some(session) = session_row(&tx, "session_id = ?1", &id_str)? else {
          return Ok(ExitOutcome::NotFound);
        };
        if session.status != SessionStatus::Active {
          return Ok(ExitOutcome::NotActive(session.status));
        }

        let paid = settled_payment_row(&tx, &id_str)?.map_or(Decimal::ZERO, |p| p.amount);
        if commit.fee_due > Decimal::ZERO && paid < commit.fee_due {
          return Ok(ExitOutcome::PaymentRequired { paid });
        }

        tx.execute(
          "UPDATE sessions SET status = 'completed', exit_time = ?2, exit_gate = ?3
           WHERE session_id = ?1 AND status = 'active'",
          params![id_str, encode_dt(commit.exit_time), commit.exit_gate],
        )?;
        release(&tx, &session)?;

        if let Some((membership_id, hours)) = commit.membership_hours {
          let membership_str = encode_uuid(membership_id);
          let used: Option<String> = tx
            .query_row(
              "SELECT hours_used FROM memberships WHERE membership_id = ?1",
              params![membership_str],
              |row| row.get(0),
            )
            .optional()?;
          if let Some(used) = used {
            let total = decode_decimal(&used)? + hours;
            tx.execute(
              "UPDATE memberships SET hours_used = ?2 WHERE membership_id = ?1",
              params![membership_str, encode_decimal(total)],
            )?;
          }
        }

        tx.commit()?;
        Ok(ExitOutcome::Completed(Session {
          status: SessionStatus::Completed,
          exit_time: Some(commit.exit_time),
          exit_gate: commit.exit_gate,
          ..session
        }))
      })
      .await
  }

  async fn cancel_session(
    &self,
    session_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Transition<Session, SessionStatus>> {
    let id_str = encode_uuid(session_id);

    self
      .transact(move |tx| {
        let Some(session) = session_row(&tx, "session_id = ?1", &id_str)? else {
          return Ok(Transition::NotFound);
        };
        if session.status != SessionStatus::Active {
          return Ok(Transition::WrongStatus(session.status));
        }
        tx.execute(
          "UPDATE sessions SET status = 'cancelled', exit_time = ?2
           WHERE session_id = ?1 AND status = 'active'",
          params![id_str, encode_dt(at)],
        )?;
        release(&tx, &session)?;
        tx.commit()?;
        Ok(Transition::Updated(Session {
          status: SessionStatus::Cancelled,
          exit_time: Some(at),
          ..session
        }))
      })
      .await
  }

  // ── Payments ──────────────────────────────────────────────────────────────

  async fn settled_payment(&self, session_id: Uuid) -> Result<Option<Payment>> {
    let id_str = encode_uuid(session_id);
    self.run(move |conn| settled_payment_row(conn, &id_str)).await
  }

  async fn settle_payment(&self, s: Settlement) -> Result<SettleOutcome> {
    self
      .transact(move |tx| {
        let session_str = encode_uuid(s.session_id);
        let Some(session) = session_row(&tx, "session_id = ?1", &session_str)? else {
          return Ok(SettleOutcome::NotFound);
        };
        if session.status != SessionStatus::Active {
          return Ok(SettleOutcome::NotActive(session.status));
        }

        if let Some(existing) = settled_payment_row(&tx, &session_str)? {
          if existing.amount >= s.fee_due {
            return Ok(SettleOutcome::AlreadySettled(existing));
          }
          let total = existing.amount + s.amount;
          if total < s.fee_due {
            return Ok(SettleOutcome::Insufficient { due: s.fee_due, paid: total });
          }
          tx.execute(
            "UPDATE payments SET amount = ?2, settled_at = ?3 WHERE payment_id = ?1",
            params![encode_uuid(existing.payment_id), encode_decimal(total), encode_dt(s.at)],
          )?;
          tx.commit()?;
          return Ok(SettleOutcome::ToppedUp(Payment {
            amount: total,
            settled_at: Some(s.at),
            ..existing
          }));
        }

        let mut discount_id = None;
        if let Some(code) = &s.discount_code {
          let Some(discount) = discount_row(&tx, "code", code)? else {
            return Ok(SettleOutcome::DiscountRejected(DiscountRejection::Unknown));
          };
          if let Err(reason) = discount.check(s.at) {
            return Ok(SettleOutcome::DiscountRejected(reason));
          }
          // Conditional increment: the cap can never be exceeded.
          let redeemed = tx.execute(
            "UPDATE discounts SET uses = uses + 1
             WHERE discount_id = ?1 AND active = 1 AND (max_uses IS NULL OR uses < max_uses)",
            params![encode_uuid(discount.discount_id)],
          )?;
          if redeemed == 0 {
            return Ok(SettleOutcome::DiscountRejected(DiscountRejection::Exhausted));
          }
          discount_id = Some(discount.discount_id);
        }

        if s.amount < s.fee_due {
          return Ok(SettleOutcome::Insufficient { due: s.fee_due, paid: s.amount });
        }

        let payment = Payment {
          payment_id: s.payment_id,
          session_id: s.session_id,
          amount: s.amount,
          discount_id,
          settled: true,
          settled_at: Some(s.at),
          receipt: s.receipt,
        };
        tx.execute(
          "INSERT INTO payments (
             payment_id, session_id, amount, discount_id, settled, settled_at, receipt
           ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
          params![
            encode_uuid(payment.payment_id),
            session_str,
            encode_decimal(payment.amount),
            payment.discount_id.map(encode_uuid),
            encode_dt(s.at),
            payment.receipt,
          ],
        )?;
        tx.commit()?;
        Ok(SettleOutcome::Settled(payment))
      })
      .await
  }

  // ── Reservations ──────────────────────────────────────────────────────────

  async fn book_reservation<F>(&self, reservation: Reservation, admit: F) -> Result<Option<Reservation>>
  where
    F: FnOnce(&ZoneSnapshot) -> bool + Send + 'static,
  {
    self
      .transact(move |tx| {
        let Some(snapshot) = load_snapshot(&tx, reservation.zone_id)? else {
          return Ok(None);
        };
        if !admit(&snapshot) {
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO reservations (
             reservation_id, vehicle_id, zone_id, start_time, end_time,
             status, confirmation, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          params![
            encode_uuid(reservation.reservation_id),
            encode_uuid(reservation.vehicle_id),
            encode_uuid(reservation.zone_id),
            encode_dt(reservation.window.start),
            encode_dt(reservation.window.end),
            encode_reservation_status(reservation.status),
            reservation.confirmation,
            encode_dt(reservation.created_at),
          ],
        )?;
        tx.commit()?;
        Ok(Some(reservation))
      })
      .await
  }

  async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
    let id_str = encode_uuid(id);
    self.run(move |conn| reservation_row(conn, "reservation_id", &id_str)).await
  }

  async fn find_reservation_by_confirmation<'a>(
    &'a self,
    confirmation: &'a str,
  ) -> Result<Option<Reservation>> {
    let confirmation = confirmation.to_owned();
    self
      .run(move |conn| reservation_row(conn, "confirmation", &confirmation))
      .await
  }

  async fn transition_reservation(
    &self,
    id: Uuid,
    from: ReservationStatus,
    to: ReservationStatus,
  ) -> Result<Transition<Reservation, ReservationStatus>> {
    let id_str = encode_uuid(id);

    self
      .transact(move |tx| {
        let Some(reservation) = reservation_row(&tx, "reservation_id", &id_str)? else {
          return Ok(Transition::NotFound);
        };
        if reservation.status != from {
          return Ok(Transition::WrongStatus(reservation.status));
        }
        tx.execute(
          "UPDATE reservations SET status = ?2 WHERE reservation_id = ?1",
          params![id_str, encode_reservation_status(to)],
        )?;
        tx.commit()?;
        Ok(Transition::Updated(Reservation { status: to, ..reservation }))
      })
      .await
  }

  async fn sweep_reservations(&self, now: DateTime<Utc>) -> Result<SweepReport> {
    let now_str = encode_dt(now);

    self
      .transact(move |tx| {
        let no_shows = tx.execute(
          "UPDATE reservations SET status = 'no_show'
           WHERE status = 'confirmed' AND end_time <= ?1",
          params![now_str],
        )?;
        let expired = tx.execute(
          "UPDATE reservations SET status = 'expired'
           WHERE status = 'checked_in' AND end_time <= ?1",
          params![now_str],
        )?;
        tx.commit()?;
        Ok(SweepReport { no_shows, expired })
      })
      .await
  }
}
