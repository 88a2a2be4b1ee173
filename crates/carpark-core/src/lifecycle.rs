//! Session lifecycle: entry, fee calculation, exit, and administrative
//! cancellation.
//!
//! ```text
//! active ──exit (paid)──▶ completed
//!   │
//!   └────cancel────────▶ cancelled
//! ```
//!
//! Both transitions are terminal and set the exit time exactly once.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  allocation::AllocationRequest,
  discount::{DiscountEngine, DiscountRejection, LineItem, Modifier, normalize_code, round},
  engine::ParkingEngine,
  membership::MemberBenefit,
  rate::{Rate, RateKind},
  session::{Payment, Session, SessionStatus},
  space::{Space, SpaceType},
  store::{ExitCommit, ExitOutcome, ParkingStore, Transition},
};

const MAX_STEP_LOOKUPS: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct EntryRequest {
  pub license_plate: String,
  pub entry_gate:    Option<String>,
  /// Restrict allocation to one zone; otherwise every zone is tried in order.
  pub zone_id:       Option<Uuid>,
  pub space_type:    Option<SpaceType>,
}

/// A successful entry.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
  pub session: Session,
  pub ticket:  String,
  pub space:   Space,
}

/// What a session owes at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
  pub session_id:       Uuid,
  pub rate_id:          Uuid,
  pub duration_minutes: i64,
  /// Hours added to a membership's usage when the session completes.
  pub billed_hours:     Decimal,
  pub base_fee:         Decimal,
  pub discounts:        Decimal,
  pub tax:              Decimal,
  pub total:            Decimal,
  pub breakdown:        Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExitReceipt {
  pub session: Session,
  pub fee:     FeeQuote,
}

/// Whether a ticket may leave right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitCheck {
  pub session_id:             Uuid,
  pub status:                 SessionStatus,
  pub is_paid:                bool,
  pub can_exit:               bool,
  pub amount_due:             Decimal,
  /// Minutes until the fee next rises above what was paid.
  pub time_remaining_minutes: Option<i64>,
}

/// Where a fee's discount comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DiscountSource<'a> {
  None,
  /// Validated now, redeemed only at settlement.
  Code(&'a str),
  /// Already redeemed by the session's settled payment.
  Redeemed(Uuid),
}

/// Everything needed to price a session, resolved once.
pub(crate) struct Pricing {
  pub rate:      Rate,
  pub modifiers: Vec<Modifier>,
  pub benefit:   Option<MemberBenefit>,
}

fn billed_hours(rate: &Rate, units: i64, duration: TimeDelta) -> Decimal {
  match rate.kind {
    RateKind::Hourly => Decimal::from(units),
    RateKind::Daily => Decimal::from(units * 24),
    RateKind::Flat => Decimal::from((duration.num_seconds().max(0) + 3_599) / 3_600),
  }
}

impl<S: ParkingStore> ParkingEngine<S> {
  // ─── Entry ────────────────────────────────────────────────────────────────

  pub async fn enter(&self, req: EntryRequest) -> Result<Entry> {
    let now = self.now();
    let vehicle = self.vehicle_by_plate(&req.license_plate).await?;

    if self
      .store
      .active_session_for_vehicle(vehicle.vehicle_id)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Err(self.already_parked(&vehicle).await);
    }

    let zones = match req.zone_id {
      Some(zone_id) => vec![self.zone(zone_id).await?.zone_id],
      None => self
        .store
        .list_zones()
        .await
        .map_err(Error::store)?
        .into_iter()
        .map(|z| z.zone_id)
        .collect(),
    };

    let session = self
      .assign(AllocationRequest {
        vehicle: vehicle.clone(),
        zones,
        preference: req.space_type,
        reservation_id: None,
        entry_gate: req.entry_gate,
        at: now,
      })
      .await?;
    info!(
      session_id = %session.session_id,
      ticket = %session.ticket,
      vehicle = %vehicle.license_plate,
      "vehicle entered"
    );
    self.entry_for(session).await
  }

  pub(crate) async fn entry_for(&self, session: Session) -> Result<Entry> {
    let space = self
      .store
      .get_space(session.space_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SpaceNotFound(session.space_id))?;
    Ok(Entry { ticket: session.ticket.clone(), session, space })
  }

  pub async fn get_session(&self, session_id: Uuid) -> Result<Session> {
    self
      .store
      .get_session(session_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SessionNotFound(session_id))
  }

  pub(crate) async fn session_by_ticket(&self, ticket: &str) -> Result<Session> {
    let ticket = ticket.trim().to_uppercase();
    let found = self.store.find_session_by_ticket(&ticket).await.map_err(Error::store)?;
    found.ok_or(Error::TicketNotFound(ticket))
  }

  // ─── Pricing ──────────────────────────────────────────────────────────────

  pub(crate) async fn pricing(
    &self,
    session: &Session,
    at: DateTime<Utc>,
    source: DiscountSource<'_>,
  ) -> Result<Pricing> {
    let rate = self.rate_for(session.zone_id, at).await?;
    let mut modifiers = Vec::new();

    match source {
      DiscountSource::None => {}
      DiscountSource::Code(code) => {
        let code = normalize_code(code);
        let discount = self
          .store
          .find_discount(&code)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| Error::DiscountInvalid {
            code:   code.clone(),
            reason: DiscountRejection::Unknown,
          })?;
        if let Err(reason) = discount.check(at) {
          warn!(%code, %reason, session_id = %session.session_id, "discount rejected");
          return Err(Error::DiscountInvalid { code, reason });
        }
        modifiers.push(Modifier::from_discount(&discount, &rate));
      }
      DiscountSource::Redeemed(discount_id) => {
        if let Some(discount) = self.store.get_discount(discount_id).await.map_err(Error::store)? {
          modifiers.push(Modifier::from_discount(&discount, &rate));
        }
      }
    }

    let benefit = self
      .store
      .active_membership(session.vehicle_id, at.date_naive())
      .await
      .map_err(Error::store)?;
    if let Some(b) = &benefit {
      modifiers.extend(b.modifiers(&rate));
    }

    Ok(Pricing { rate, modifiers, benefit })
  }

  pub(crate) fn quote(
    &self,
    session: &Session,
    pricing: &Pricing,
    duration: TimeDelta,
    at: DateTime<Utc>,
  ) -> Result<FeeQuote> {
    if duration < TimeDelta::zero() {
      return Err(Error::InvalidState(format!(
        "session {} has a negative duration; clock moved backwards",
        session.session_id
      )));
    }
    let charge = self.rates.compute(&pricing.rate, duration, at)?;
    let mut breakdown: Vec<LineItem> = charge
      .lines
      .into_iter()
      .map(|l| LineItem { amount: round(l.amount), ..l })
      .collect();
    let base_fee = breakdown.iter().map(|l| l.amount).sum();
    let applied = DiscountEngine::apply(base_fee, &pricing.modifiers);
    breakdown.extend(applied.lines.into_iter().filter(|l| !l.amount.is_zero()));

    Ok(FeeQuote {
      session_id: session.session_id,
      rate_id: pricing.rate.rate_id,
      duration_minutes: duration.num_minutes(),
      billed_hours: billed_hours(&pricing.rate, charge.units, duration),
      base_fee,
      discounts: applied.discounted,
      tax: Decimal::ZERO,
      total: applied.total,
      breakdown,
    })
  }

  /// Where a settled session's discount comes from.
  pub(crate) fn redeemed(payment: Option<&Payment>) -> DiscountSource<'static> {
    match payment.and_then(|p| p.discount_id) {
      Some(id) => DiscountSource::Redeemed(id),
      None => DiscountSource::None,
    }
  }

  /// Price an active session as of now. A code is validated but not
  /// redeemed. Sessions that already paid keep the discount they redeemed
  /// and cannot take a new code.
  pub async fn calculate_fee(&self, session_id: Uuid, discount_code: Option<&str>) -> Result<FeeQuote> {
    let now = self.now();
    let session = self.get_session(session_id).await?;
    if !session.is_active() {
      return Err(Error::InvalidState(format!("session {session_id} is {}", session.status)));
    }

    let settled = self.store.settled_payment(session_id).await.map_err(Error::store)?;
    let source = match (discount_code, &settled) {
      (Some(_), Some(_)) => {
        return Err(Error::InvalidState(format!(
          "session {session_id} is already paid; discount codes can no longer be added"
        )));
      }
      (Some(code), None) => DiscountSource::Code(code),
      (None, settled) => Self::redeemed(settled.as_ref()),
    };

    let pricing = self.pricing(&session, now, source).await?;
    self.quote(&session, &pricing, now - session.entry_time, now)
  }

  // ─── Exit ─────────────────────────────────────────────────────────────────

  /// Let a vehicle out if its fee, recomputed now, is covered.
  pub async fn exit(&self, ticket: &str, exit_gate: Option<String>) -> Result<ExitReceipt> {
    let now = self.now();
    let session = self.session_by_ticket(ticket).await?;
    if !session.is_active() {
      return Err(Error::InvalidState(format!(
        "session {} is already {}",
        session.session_id, session.status
      )));
    }

    let settled = self.store.settled_payment(session.session_id).await.map_err(Error::store)?;
    let pricing = self.pricing(&session, now, Self::redeemed(settled.as_ref())).await?;
    let fee = self.quote(&session, &pricing, now - session.entry_time, now)?;

    let commit = ExitCommit {
      session_id:       session.session_id,
      exit_time:        now,
      exit_gate:        exit_gate.clone(),
      fee_due:          fee.total,
      membership_hours: pricing
        .benefit
        .as_ref()
        .map(|b| (b.membership.membership_id, fee.billed_hours)),
    };
    match self.store.complete_session(commit).await.map_err(Error::store)? {
      ExitOutcome::Completed(session) => {
        info!(
          session_id = %session.session_id,
          ticket = %session.ticket,
          fee = %fee.total,
          gate = exit_gate.as_deref().unwrap_or("-"),
          "vehicle exited"
        );
        Ok(ExitReceipt { session, fee })
      }
      ExitOutcome::PaymentRequired { paid } => {
        warn!(
          session_id = %session.session_id,
          due = %fee.total,
          %paid,
          "exit blocked: payment required"
        );
        Err(Error::PaymentRequired { due: fee.total, paid })
      }
      ExitOutcome::NotActive(status) => Err(Error::InvalidState(format!(
        "session {} is already {status}",
        session.session_id
      ))),
      ExitOutcome::NotFound => Err(Error::SessionNotFound(session.session_id)),
    }
  }

  /// Whether the ticket could leave now, without changing anything.
  pub async fn validate_exit(&self, ticket: &str) -> Result<ExitCheck> {
    let now = self.now();
    let session = self.session_by_ticket(ticket).await?;
    let settled = self.store.settled_payment(session.session_id).await.map_err(Error::store)?;
    let paid = settled.as_ref().map_or(Decimal::ZERO, |p| p.amount);

    if !session.is_active() {
      return Ok(ExitCheck {
        session_id:             session.session_id,
        status:                 session.status,
        is_paid:                settled.is_some(),
        can_exit:               false,
        amount_due:             Decimal::ZERO,
        time_remaining_minutes: None,
      });
    }

    let pricing = self.pricing(&session, now, Self::redeemed(settled.as_ref())).await?;
    let elapsed = now - session.entry_time;
    let fee = self.quote(&session, &pricing, elapsed, now)?;

    let is_paid = settled.is_some() && paid >= fee.total;
    let time_remaining_minutes = if is_paid {
      self.time_until_exceeds(&session, &pricing, elapsed, paid, now)?
    } else {
      None
    };

    Ok(ExitCheck {
      session_id: session.session_id,
      status: session.status,
      is_paid,
      can_exit: is_paid || fee.total.is_zero(),
      amount_due: (fee.total - paid).max(Decimal::ZERO),
      time_remaining_minutes,
    })
  }

  /// Walk billing steps forward until the fee exceeds `paid`.
  fn time_until_exceeds(
    &self,
    session: &Session,
    pricing: &Pricing,
    elapsed: TimeDelta,
    paid: Decimal,
    now: DateTime<Utc>,
  ) -> Result<Option<i64>> {
    let mut cursor = elapsed;
    for _ in 0..MAX_STEP_LOOKUPS {
      let Some(step) = self.rates.next_step(&pricing.rate, cursor) else {
        return Ok(None);
      };
      let beyond = step.max(cursor) + TimeDelta::seconds(1);
      if self.quote(session, pricing, beyond, now)?.total > paid {
        return Ok(Some((beyond - elapsed).num_minutes()));
      }
      cursor = beyond;
    }
    Ok(None)
  }

  // ─── Cancellation ─────────────────────────────────────────────────────────

  /// Administrative override: close an active session without payment.
  pub async fn cancel_session(&self, session_id: Uuid, reason: Option<&str>) -> Result<Session> {
    match self
      .store
      .cancel_session(session_id, self.now())
      .await
      .map_err(Error::store)?
    {
      Transition::Updated(session) => {
        warn!(%session_id, reason = reason.unwrap_or("-"), "session cancelled");
        Ok(session)
      }
      Transition::WrongStatus(status) => {
        Err(Error::InvalidState(format!("session {session_id} is already {status}")))
      }
      Transition::NotFound => Err(Error::SessionNotFound(session_id)),
    }
  }
}
