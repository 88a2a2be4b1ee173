//! Membership plans and the vehicles they cover.

use std::fmt;

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{discount::Modifier, rate::Rate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPlan {
  pub plan_id:          Uuid,
  pub name:             String,
  pub discount_percent: Decimal,
  /// Hours per membership term that are billed at zero.
  pub included_hours:   Option<u32>,
  /// Length of one term; a renewal adds this much.
  pub duration_months:  u32,
  pub active:           bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMembershipPlan {
  pub name:             String,
  pub discount_percent: Decimal,
  pub included_hours:   Option<u32>,
  #[serde(default = "one_month")]
  pub duration_months:  u32,
}

fn one_month() -> u32 { 1 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
  Active,
  Cancelled,
}

impl MembershipStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for MembershipStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  pub membership_id: Uuid,
  pub plan_id:       Uuid,
  pub vehicle_ids:   Vec<Uuid>,
  /// Billed hours accumulated by completed sessions.
  pub hours_used:    Decimal,
  pub valid_from:    NaiveDate,
  pub valid_to:      NaiveDate,
  pub status:        MembershipStatus,
  pub auto_renew:    bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMembership {
  pub plan_id:     Uuid,
  pub vehicle_ids: Vec<Uuid>,
  pub valid_from:  NaiveDate,
  pub valid_to:    NaiveDate,
  #[serde(default)]
  pub auto_renew:  bool,
}

impl Membership {
  pub fn is_valid_on(&self, day: NaiveDate) -> bool {
    self.status == MembershipStatus::Active && self.valid_from <= day && day <= self.valid_to
  }

  /// The membership after renewing it on `today` under `plan`.
  ///
  /// A membership still in its term is extended by one term from its current
  /// end. A cancelled or lapsed one starts a fresh term today with its hours
  /// reset.
  pub fn renewed(&self, plan: &MembershipPlan, today: NaiveDate) -> Membership {
    let term = Months::new(plan.duration_months.max(1));
    let add = |from: NaiveDate| from.checked_add_months(term).unwrap_or(NaiveDate::MAX);
    if self.status == MembershipStatus::Active && self.valid_to >= today {
      return Membership { valid_to: add(self.valid_to), ..self.clone() };
    }
    Membership {
      valid_from: today,
      valid_to: add(today),
      hours_used: Decimal::ZERO,
      status: MembershipStatus::Active,
      ..self.clone()
    }
  }
}

/// How much of a membership's term and included hours is left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipUsage {
  pub membership_id:   Uuid,
  pub status:          MembershipStatus,
  pub included_hours:  Option<u32>,
  pub hours_used:      Decimal,
  /// `None` when the plan includes no hours.
  pub remaining_hours: Option<Decimal>,
  pub days_remaining:  i64,
}

/// A membership together with the plan that defines its benefits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBenefit {
  pub membership: Membership,
  pub plan:       MembershipPlan,
}

impl MemberBenefit {
  /// Included hours still unused this term.
  pub fn remaining_hours(&self) -> Decimal {
    self
      .plan
      .included_hours
      .map(|h| (Decimal::from(h) - self.membership.hours_used).max(Decimal::ZERO))
      .unwrap_or(Decimal::ZERO)
  }

  pub fn usage(&self, today: NaiveDate) -> MembershipUsage {
    let included = self.plan.included_hours.filter(|h| *h > 0);
    MembershipUsage {
      membership_id:   self.membership.membership_id,
      status:          self.membership.status,
      included_hours:  included,
      hours_used:      self.membership.hours_used,
      remaining_hours: included.map(|_| self.remaining_hours()),
      days_remaining:  (self.membership.valid_to - today).num_days().max(0),
    }
  }

  /// Modifiers contributed to a fee computed under `rate`.
  pub fn modifiers(&self, rate: &Rate) -> Vec<Modifier> {
    let mut out = Vec::new();
    if self.plan.discount_percent > Decimal::ZERO {
      out.push(Modifier::Percentage {
        label:   format!("Membership {}", self.plan.name),
        percent: self.plan.discount_percent,
      });
    }
    let remaining = self.remaining_hours();
    if remaining > Decimal::ZERO {
      out.push(Modifier::Amount {
        label:  format!("Membership included hours ({remaining} left)"),
        amount: remaining * rate.hour_value(),
      });
    }
    out
  }
}
