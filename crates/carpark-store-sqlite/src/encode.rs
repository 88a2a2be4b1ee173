//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 UTC with microseconds and a `Z` suffix; dates are
//! `YYYY-MM-DD`; money is decimal text; UUIDs are hyphenated lowercase.

use std::str::FromStr as _;

use carpark_core::{
  discount::{Discount, DiscountKind},
  membership::{Membership, MembershipPlan, MembershipStatus},
  rate::{PeakPricing, Rate, RateKind},
  reservation::{Reservation, ReservationStatus, TimeWindow},
  session::{Payment, Session, SessionStatus},
  space::{Space, SpaceStatus, SpaceType, Zone},
  vehicle::Vehicle,
};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M:%S").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M:%S").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_decimal(d: Decimal) -> String { d.normalize().to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Declare `encode_*`/`decode_*` for a fieldless enum stored as text.
macro_rules! text_enum {
  ($encode:ident, $decode:ident, $ty:ident, $column:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
    pub fn $encode(v: $ty) -> &'static str {
      match v {
        $($ty::$variant => $text,)+
      }
    }

    pub fn $decode(s: &str) -> Result<$ty> {
      match s {
        $($text => Ok($ty::$variant),)+
        other => Err(Error::Decode { column: $column, value: other.to_owned() }),
      }
    }
  };
}

text_enum!(encode_space_type, decode_space_type, SpaceType, "space_type", {
  Standard => "standard",
  Compact => "compact",
  Handicapped => "handicapped",
  Ev => "ev",
  Motorcycle => "motorcycle",
});

text_enum!(encode_space_status, decode_space_status, SpaceStatus, "space status", {
  Available => "available",
  Occupied => "occupied",
  Reserved => "reserved",
  Maintenance => "maintenance",
});

text_enum!(encode_rate_kind, decode_rate_kind, RateKind, "rate kind", {
  Hourly => "hourly",
  Daily => "daily",
  Flat => "flat",
});

text_enum!(encode_discount_kind, decode_discount_kind, DiscountKind, "discount kind", {
  Percentage => "percentage",
  FixedAmount => "fixed_amount",
  FreeHours => "free_hours",
});

text_enum!(encode_session_status, decode_session_status, SessionStatus, "session status", {
  Active => "active",
  Completed => "completed",
  Cancelled => "cancelled",
});

text_enum!(
  encode_membership_status,
  decode_membership_status,
  MembershipStatus,
  "membership status",
  {
    Active => "active",
    Cancelled => "cancelled",
  }
);

text_enum!(
  encode_reservation_status,
  decode_reservation_status,
  ReservationStatus,
  "reservation status",
  {
    Confirmed => "confirmed",
    CheckedIn => "checked_in",
    Cancelled => "cancelled",
    Expired => "expired",
    NoShow => "no_show",
  }
);

// ─── Row types ───────────────────────────────────────────────────────────────
//
// Each `Raw*` holds the column values exactly as read; `COLUMNS` lists them
// in `from_row` order so `SELECT` statements and decoders cannot drift.

pub struct RawZone {
  pub zone_id:    String,
  pub name:       String,
  pub level:      i32,
  pub created_at: String,
}

impl RawZone {
  pub const COLUMNS: &'static str = "zone_id, name, level, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      zone_id:    row.get(0)?,
      name:       row.get(1)?,
      level:      row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_zone(self) -> Result<Zone> {
    Ok(Zone {
      zone_id:    decode_uuid(&self.zone_id)?,
      name:       self.name,
      level:      self.level,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawSpace {
  pub space_id:   String,
  pub zone_id:    String,
  pub label:      String,
  pub space_type: String,
  pub status:     String,
}

impl RawSpace {
  pub const COLUMNS: &'static str = "space_id, zone_id, label, space_type, status";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      space_id:   row.get(0)?,
      zone_id:    row.get(1)?,
      label:      row.get(2)?,
      space_type: row.get(3)?,
      status:     row.get(4)?,
    })
  }

  pub fn into_space(self) -> Result<Space> {
    Ok(Space {
      space_id:   decode_uuid(&self.space_id)?,
      zone_id:    decode_uuid(&self.zone_id)?,
      label:      self.label,
      space_type: decode_space_type(&self.space_type)?,
      status:     decode_space_status(&self.status)?,
    })
  }
}

pub struct RawVehicle {
  pub vehicle_id:    String,
  pub license_plate: String,
  pub is_ev:         bool,
  pub created_at:    String,
}

impl RawVehicle {
  pub const COLUMNS: &'static str = "vehicle_id, license_plate, is_ev, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      vehicle_id:    row.get(0)?,
      license_plate: row.get(1)?,
      is_ev:         row.get(2)?,
      created_at:    row.get(3)?,
    })
  }

  pub fn into_vehicle(self) -> Result<Vehicle> {
    Ok(Vehicle {
      vehicle_id:    decode_uuid(&self.vehicle_id)?,
      license_plate: self.license_plate,
      is_ev:         self.is_ev,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawRate {
  pub rate_id:         String,
  pub name:            String,
  pub zone_id:         Option<String>,
  pub kind:            String,
  pub amount:          String,
  pub grace_minutes:   u32,
  pub effective_from:  String,
  pub effective_to:    Option<String>,
  pub active:          bool,
  pub peak_start:      Option<String>,
  pub peak_end:        Option<String>,
  pub peak_multiplier: Option<String>,
}

impl RawRate {
  pub const COLUMNS: &'static str = "rate_id, name, zone_id, kind, amount, grace_minutes, \
                             effective_from, effective_to, active, peak_start, peak_end, \
                             peak_multiplier";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rate_id:         row.get(0)?,
      name:            row.get(1)?,
      zone_id:         row.get(2)?,
      kind:            row.get(3)?,
      amount:          row.get(4)?,
      grace_minutes:   row.get(5)?,
      effective_from:  row.get(6)?,
      effective_to:    row.get(7)?,
      active:          row.get(8)?,
      peak_start:      row.get(9)?,
      peak_end:        row.get(10)?,
      peak_multiplier: row.get(11)?,
    })
  }

  pub fn into_rate(self) -> Result<Rate> {
    let peak = match (self.peak_start, self.peak_end, self.peak_multiplier) {
      (None, None, None) => None,
      (Some(start), Some(end), Some(multiplier)) => Some(PeakPricing {
        start:      decode_time(&start)?,
        end:        decode_time(&end)?,
        multiplier: decode_decimal(&multiplier)?,
      }),
      _ => {
        return Err(Error::Decode { column: "peak pricing", value: self.rate_id });
      }
    };
    Ok(Rate {
      rate_id:         decode_uuid(&self.rate_id)?,
      name:            self.name,
      zone_id:         decode_opt_uuid(self.zone_id)?,
      kind:            decode_rate_kind(&self.kind)?,
      amount:          decode_decimal(&self.amount)?,
      grace_minutes:   self.grace_minutes,
      effective_from:  decode_dt(&self.effective_from)?,
      effective_to:    decode_opt_dt(self.effective_to)?,
      active:          self.active,
      peak,
    })
  }
}

pub struct RawDiscount {
  pub discount_id: String,
  pub code:        String,
  pub name:        String,
  pub kind:        String,
  pub value:       String,
  pub valid_from:  String,
  pub valid_to:    String,
  pub max_uses:    Option<u32>,
  pub uses:        u32,
  pub active:      bool,
}

impl RawDiscount {
  pub const COLUMNS: &'static str = "discount_id, code, name, kind, value, valid_from, valid_to, \
                             max_uses, uses, active";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      discount_id: row.get(0)?,
      code:        row.get(1)?,
      name:        row.get(2)?,
      kind:        row.get(3)?,
      value:       row.get(4)?,
      valid_from:  row.get(5)?,
      valid_to:    row.get(6)?,
      max_uses:    row.get(7)?,
      uses:        row.get(8)?,
      active:      row.get(9)?,
    })
  }

  pub fn into_discount(self) -> Result<Discount> {
    Ok(Discount {
      discount_id: decode_uuid(&self.discount_id)?,
      code:        self.code,
      name:        self.name,
      kind:        decode_discount_kind(&self.kind)?,
      value:       decode_decimal(&self.value)?,
      valid_from:  decode_dt(&self.valid_from)?,
      valid_to:    decode_dt(&self.valid_to)?,
      max_uses:    self.max_uses,
      uses:        self.uses,
      active:      self.active,
    })
  }
}

pub struct RawPlan {
  pub plan_id:          String,
  pub name:             String,
  pub discount_percent: String,
  pub included_hours:   Option<u32>,
  pub duration_months:  u32,
  pub active:           bool,
}

impl RawPlan {
  pub const COLUMNS: &'static str =
    "plan_id, name, discount_percent, included_hours, duration_months, active";
  /// `COLUMNS` qualified by the `p` alias, for joins.
  pub const JOINED_COLUMNS: &'static str =
    "p.plan_id, p.name, p.discount_percent, p.included_hours, p.duration_months, p.active";

  /// Read the plan columns starting at `offset`, for joined selects.
  pub fn from_row_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      plan_id:          row.get(offset)?,
      name:             row.get(offset + 1)?,
      discount_percent: row.get(offset + 2)?,
      included_hours:   row.get(offset + 3)?,
      duration_months:  row.get(offset + 4)?,
      active:           row.get(offset + 5)?,
    })
  }

  pub fn into_plan(self) -> Result<MembershipPlan> {
    Ok(MembershipPlan {
      plan_id:          decode_uuid(&self.plan_id)?,
      name:             self.name,
      discount_percent: decode_decimal(&self.discount_percent)?,
      included_hours:   self.included_hours,
      duration_months:  self.duration_months,
      active:           self.active,
    })
  }
}

pub struct RawMembership {
  pub membership_id: String,
  pub plan_id:       String,
  pub hours_used:    String,
  pub valid_from:    String,
  pub valid_to:      String,
  pub status:        String,
  pub auto_renew:    bool,
}

impl RawMembership {
  pub const COLUMNS: &'static str = "m.membership_id, m.plan_id, m.hours_used, m.valid_from, \
                             m.valid_to, m.status, m.auto_renew";
  /// Number of columns in `COLUMNS`.
  pub const WIDTH: usize = 7;

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      membership_id: row.get(0)?,
      plan_id:       row.get(1)?,
      hours_used:    row.get(2)?,
      valid_from:    row.get(3)?,
      valid_to:      row.get(4)?,
      status:        row.get(5)?,
      auto_renew:    row.get(6)?,
    })
  }

  pub fn into_membership(self, vehicle_ids: Vec<Uuid>) -> Result<Membership> {
    Ok(Membership {
      membership_id: decode_uuid(&self.membership_id)?,
      plan_id: decode_uuid(&self.plan_id)?,
      vehicle_ids,
      hours_used: decode_decimal(&self.hours_used)?,
      valid_from: decode_date(&self.valid_from)?,
      valid_to: decode_date(&self.valid_to)?,
      status: decode_membership_status(&self.status)?,
      auto_renew: self.auto_renew,
    })
  }
}

pub struct RawSession {
  pub session_id:     String,
  pub vehicle_id:     String,
  pub zone_id:        String,
  pub space_id:       String,
  pub reservation_id: Option<String>,
  pub ticket:         String,
  pub entry_time:     String,
  pub entry_gate:     Option<String>,
  pub exit_time:      Option<String>,
  pub exit_gate:      Option<String>,
  pub status:         String,
}

impl RawSession {
  pub const COLUMNS: &'static str = "session_id, vehicle_id, zone_id, space_id, reservation_id, ticket, \
                             entry_time, entry_gate, exit_time, exit_gate, status";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:     row.get(0)?,
      vehicle_id:     row.get(1)?,
      zone_id:        row.get(2)?,
      space_id:       row.get(3)?,
      reservation_id: row.get(4)?,
      ticket:         row.get(5)?,
      entry_time:     row.get(6)?,
      entry_gate:     row.get(7)?,
      exit_time:      row.get(8)?,
      exit_gate:      row.get(9)?,
      status:         row.get(10)?,
    })
  }

  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      session_id:     decode_uuid(&self.session_id)?,
      vehicle_id:     decode_uuid(&self.vehicle_id)?,
      zone_id:        decode_uuid(&self.zone_id)?,
      space_id:       decode_uuid(&self.space_id)?,
      reservation_id: decode_opt_uuid(self.reservation_id)?,
      ticket:         self.ticket,
      entry_time:     decode_dt(&self.entry_time)?,
      entry_gate:     self.entry_gate,
      exit_time:      decode_opt_dt(self.exit_time)?,
      exit_gate:      self.exit_gate,
      status:         decode_session_status(&self.status)?,
    })
  }
}

pub struct RawPayment {
  pub payment_id:  String,
  pub session_id:  String,
  pub amount:      String,
  pub discount_id: Option<String>,
  pub settled:     bool,
  pub settled_at:  Option<String>,
  pub receipt:     String,
}

impl RawPayment {
  pub const COLUMNS: &'static str = "payment_id, session_id, amount, discount_id, settled, settled_at, \
                             receipt";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      payment_id:  row.get(0)?,
      session_id:  row.get(1)?,
      amount:      row.get(2)?,
      discount_id: row.get(3)?,
      settled:     row.get(4)?,
      settled_at:  row.get(5)?,
      receipt:     row.get(6)?,
    })
  }

  pub fn into_payment(self) -> Result<Payment> {
    Ok(Payment {
      payment_id:  decode_uuid(&self.payment_id)?,
      session_id:  decode_uuid(&self.session_id)?,
      amount:      decode_decimal(&self.amount)?,
      discount_id: decode_opt_uuid(self.discount_id)?,
      settled:     self.settled,
      settled_at:  decode_opt_dt(self.settled_at)?,
      receipt:     self.receipt,
    })
  }
}

pub struct RawReservation {
  pub reservation_id: String,
  pub vehicle_id:     String,
  pub zone_id:        String,
  pub start_time:     String,
  pub end_time:       String,
  pub status:         String,
  pub confirmation:   String,
  pub created_at:     String,
}

impl RawReservation {
  pub const COLUMNS: &'static str = "reservation_id, vehicle_id, zone_id, start_time, end_time, status, \
                             confirmation, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      reservation_id: row.get(0)?,
      vehicle_id:     row.get(1)?,
      zone_id:        row.get(2)?,
      start_time:     row.get(3)?,
      end_time:       row.get(4)?,
      status:         row.get(5)?,
      confirmation:   row.get(6)?,
      created_at:     row.get(7)?,
    })
  }

  pub fn into_reservation(self) -> Result<Reservation> {
    Ok(Reservation {
      reservation_id: decode_uuid(&self.reservation_id)?,
      vehicle_id:     decode_uuid(&self.vehicle_id)?,
      zone_id:        decode_uuid(&self.zone_id)?,
      window:         TimeWindow {
        start: decode_dt(&self.start_time)?,
        end:   decode_dt(&self.end_time)?,
      },
      status:         decode_reservation_status(&self.status)?,
      confirmation:   self.confirmation,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}
