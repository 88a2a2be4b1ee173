//! Rates and the [`RateEngine`] that turns a duration into an amount.
//!
//! All rounding rules live here. Durations are measured in whole seconds;
//! partial hours and partial days always round up.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, discount::LineItem};

const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateKind {
  Hourly,
  Daily,
  Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
  pub rate_id:        Uuid,
  pub name:           String,
  /// `None` applies facility-wide.
  pub zone_id:        Option<Uuid>,
  pub kind:           RateKind,
  pub amount:         Decimal,
  /// Only consulted for [`RateKind::Hourly`].
  pub grace_minutes:  u32,
  pub effective_from: DateTime<Utc>,
  pub effective_to:   Option<DateTime<Utc>>,
  pub active:         bool,
  /// Hourly charges priced inside this window are multiplied.
  pub peak:           Option<PeakPricing>,
}

/// A daily UTC time-of-day window with a price multiplier.
///
/// Both ends are inclusive. A window whose `end` is before its `start`
/// crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakPricing {
  pub start:      NaiveTime,
  pub end:        NaiveTime,
  pub multiplier: Decimal,
}

impl PeakPricing {
  pub fn covers(&self, at: DateTime<Utc>) -> bool {
    let t = at.time();
    if self.start <= self.end {
      self.start <= t && t <= self.end
    } else {
      t >= self.start || t <= self.end
    }
  }

  /// The surcharge as a percentage of the base charge.
  fn percent(&self) -> Decimal {
    ((self.multiplier - Decimal::ONE) * Decimal::ONE_HUNDRED).normalize()
  }
}

impl Rate {
  pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
    self.active
      && self.effective_from <= at
      && self.effective_to.is_none_or(|to| at <= to)
  }

  fn grace_secs(&self) -> i64 { i64::from(self.grace_minutes) * 60 }

  /// What one free hour is worth under this rate.
  pub fn hour_value(&self) -> Decimal {
    match self.kind {
      RateKind::Hourly => self.amount,
      RateKind::Daily => self.amount / Decimal::from(24),
      RateKind::Flat => self.amount,
    }
  }
}

/// Input to [`crate::store::ParkingStore::add_rate`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewRate {
  pub name:           String,
  pub zone_id:        Option<Uuid>,
  pub kind:           RateKind,
  pub amount:         Decimal,
  #[serde(default)]
  pub grace_minutes:  u32,
  pub effective_from: DateTime<Utc>,
  pub effective_to:   Option<DateTime<Utc>>,
  #[serde(default)]
  pub peak:           Option<PeakPricing>,
}

/// How the grace period interacts with hourly billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GracePolicy {
  /// Grace is deducted from the duration before rounding up.
  #[default]
  Subtract,
  /// Stays within grace are free; longer stays bill the whole duration.
  Waive,
}

/// Pick the rate in force for `zone_id` at `at`.
///
/// Zone-scoped rates win over facility-wide ones. Within a scope the latest
/// `effective_from` wins, ties broken by the highest identity.
pub fn select_rate(rates: &[Rate], zone_id: Uuid, at: DateTime<Utc>) -> Option<&Rate> {
  let latest = |scoped: bool| {
    rates
      .iter()
      .filter(|r| r.is_effective_at(at))
      .filter(|r| if scoped { r.zone_id == Some(zone_id) } else { r.zone_id.is_none() })
      .max_by_key(|r| (r.effective_from, r.rate_id))
  };
  latest(true).or_else(|| latest(false))
}

/// A priced duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
  /// Billable hours, days, or `1` for a flat charge; `0` when free.
  pub units:  i64,
  /// Sum of `lines`, unrounded.
  pub amount: Decimal,
  /// The base charge, then a peak surcharge when one applies.
  pub lines:  Vec<LineItem>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RateEngine {
  pub grace_policy: GracePolicy,
}

impl RateEngine {
  pub fn new(grace_policy: GracePolicy) -> Self { Self { grace_policy } }

  /// Price `duration` under `rate` as of `at`. Peak pricing is decided by
  /// the time of day of `at`.
  pub fn compute(&self, rate: &Rate, duration: TimeDelta, at: DateTime<Utc>) -> Result<Charge> {
    if duration < TimeDelta::zero() {
      return Err(Error::InvalidRate(format!("negative duration {duration}")));
    }
    if !rate.active {
      return Err(Error::InvalidRate(format!("rate {} is inactive", rate.rate_id)));
    }
    if !rate.is_effective_at(at) {
      return Err(Error::InvalidRate(format!("rate {} is not effective at {at}", rate.rate_id)));
    }

    let units = self.units(rate, duration.num_seconds());
    let line = |description: String, amount: Decimal| LineItem { description, amount };
    let lines = match rate.kind {
      RateKind::Flat => vec![line(format!("Flat rate @ {}", rate.amount), rate.amount)],
      RateKind::Hourly if units == 0 => vec![line("Within grace period".to_owned(), Decimal::ZERO)],
      RateKind::Hourly => {
        let base = rate.amount * Decimal::from(units);
        let mut lines = vec![line(format!("Parking ({units} hour(s) @ {}/hr)", rate.amount), base)];
        if let Some(peak) = rate.peak.filter(|p| p.covers(at) && p.multiplier != Decimal::ONE) {
          lines.push(line(
            format!("Peak hour surcharge ({}%)", peak.percent()),
            base * (peak.multiplier - Decimal::ONE),
          ));
        }
        lines
      }
      RateKind::Daily => vec![line(
        format!("Parking ({units} day(s) @ {}/day)", rate.amount),
        rate.amount * Decimal::from(units),
      )],
    };
    let amount = lines.iter().map(|l| l.amount).sum();
    Ok(Charge { units, amount, lines })
  }

  fn units(&self, rate: &Rate, secs: i64) -> i64 {
    match rate.kind {
      RateKind::Flat => 1,
      RateKind::Daily => ceil_div(secs, DAY),
      RateKind::Hourly => {
        let grace = rate.grace_secs();
        match self.grace_policy {
          GracePolicy::Subtract => ceil_div((secs - grace).max(0), HOUR),
          GracePolicy::Waive if secs <= grace => 0,
          GracePolicy::Waive => ceil_div(secs, HOUR),
        }
      }
    }
  }

  /// The longest duration, not shorter than `duration`, that still bills the
  /// same number of units. `None` when the charge never steps up.
  pub fn next_step(&self, rate: &Rate, duration: TimeDelta) -> Option<TimeDelta> {
    let secs = duration.num_seconds().max(0);
    let units = self.units(rate, secs);
    let boundary = match rate.kind {
      RateKind::Flat => return None,
      RateKind::Daily => units * DAY,
      RateKind::Hourly => {
        let grace = rate.grace_secs();
        match (self.grace_policy, units) {
          (_, 0) => grace,
          (GracePolicy::Subtract, u) => grace + u * HOUR,
          (GracePolicy::Waive, u) => u * HOUR,
        }
      }
    };
    Some(TimeDelta::seconds(boundary))
  }
}

fn ceil_div(n: i64, d: i64) -> i64 { (n + d - 1) / d }
