//! Discount codes, membership modifiers, and the [`DiscountEngine`].
//!
//! Order of operations: every percentage (code or membership) is summed and
//! taken off the base once; flat amounts are subtracted afterwards in the
//! order supplied. The running amount never drops below zero.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::rate::Rate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
  Percentage,
  FixedAmount,
  FreeHours,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
  pub discount_id: Uuid,
  /// Unique, upper-case.
  pub code:        String,
  pub name:        String,
  pub kind:        DiscountKind,
  /// Percent, currency amount, or hours depending on `kind`.
  pub value:       Decimal,
  pub valid_from:  DateTime<Utc>,
  pub valid_to:    DateTime<Utc>,
  /// `None` means unlimited.
  pub max_uses:    Option<u32>,
  pub uses:        u32,
  pub active:      bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDiscount {
  pub code:       String,
  pub name:       String,
  pub kind:       DiscountKind,
  pub value:      Decimal,
  pub valid_from: DateTime<Utc>,
  pub valid_to:   DateTime<Utc>,
  pub max_uses:   Option<u32>,
}

/// Why a discount code cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountRejection {
  #[error("unknown code")]
  Unknown,
  #[error("not active")]
  Inactive,
  #[error("not yet valid")]
  NotYetValid,
  #[error("expired")]
  Expired,
  #[error("usage limit reached")]
  Exhausted,
}

impl Discount {
  /// Validity at `now`; the window is inclusive at both ends.
  pub fn check(&self, now: DateTime<Utc>) -> Result<(), DiscountRejection> {
    if !self.active {
      return Err(DiscountRejection::Inactive);
    }
    if now < self.valid_from {
      return Err(DiscountRejection::NotYetValid);
    }
    if now > self.valid_to {
      return Err(DiscountRejection::Expired);
    }
    if self.max_uses.is_some_and(|max| self.uses >= max) {
      return Err(DiscountRejection::Exhausted);
    }
    Ok(())
  }
}

pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }

/// One line of a fee breakdown. Reductions carry negative amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
  pub description: String,
  pub amount:      Decimal,
}

/// A single adjustment fed to [`DiscountEngine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
  Percentage { label: String, percent: Decimal },
  Amount { label: String, amount: Decimal },
}

impl Modifier {
  /// Convert a discount into a modifier priced against `rate`. Free hours
  /// become an amount worth that many hours of the rate.
  pub fn from_discount(discount: &Discount, rate: &Rate) -> Self {
    let label = format!("Discount {}", discount.code);
    match discount.kind {
      DiscountKind::Percentage => Self::Percentage { label, percent: discount.value },
      DiscountKind::FixedAmount => Self::Amount { label, amount: discount.value },
      DiscountKind::FreeHours => Self::Amount {
        label:  format!("{label} ({} free hour(s))", discount.value),
        amount: discount.value * rate.hour_value(),
      },
    }
  }
}

/// The result of [`DiscountEngine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
  pub total:      Decimal,
  /// Sum of reductions actually taken, as a positive number.
  pub discounted: Decimal,
  pub lines:      Vec<LineItem>,
}

pub struct DiscountEngine;

impl DiscountEngine {
  pub fn apply(base: Decimal, modifiers: &[Modifier]) -> Applied {
    let base = base.max(Decimal::ZERO);
    let hundred = Decimal::from(100);
    let mut lines = Vec::new();

    let percent: Decimal = modifiers
      .iter()
      .filter_map(|m| match m {
        Modifier::Percentage { percent, .. } => Some(*percent),
        Modifier::Amount { .. } => None,
      })
      .sum();
    let mut running = (base * (Decimal::ONE - percent / hundred)).max(Decimal::ZERO);

    // Attribute the percentage reduction line by line, never more than taken.
    let mut unattributed = base - running;
    for m in modifiers {
      if let Modifier::Percentage { label, percent } = m {
        let share = (base * *percent / hundred).min(unattributed).max(Decimal::ZERO);
        unattributed -= share;
        lines.push(LineItem {
          description: format!("{label} ({percent}%)"),
          amount:      -round(share),
        });
      }
    }

    for m in modifiers {
      if let Modifier::Amount { label, amount } = m {
        let taken = (*amount).max(Decimal::ZERO).min(running);
        running -= taken;
        lines.push(LineItem { description: label.clone(), amount: -round(taken) });
      }
    }

    let total = round(running);
    Applied { total, discounted: round(base) - total, lines }
  }
}

/// Currency rounding used for every reported amount.
pub fn round(amount: Decimal) -> Decimal {
  amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
