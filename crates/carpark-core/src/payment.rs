//! Settling a session's fee.
//!
//! There is no payment gateway: settlement atomically records the amount as
//! paid, redeeming the discount code in the same store transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  discount::normalize_code,
  engine::ParkingEngine,
  lifecycle::{DiscountSource, FeeQuote},
  session::Payment,
  store::{ParkingStore, SettleOutcome, Settlement},
  token,
};

#[derive(Debug, Clone, Deserialize)]
pub struct SettleRequest {
  pub session_id:    Uuid,
  pub amount:        Decimal,
  pub discount_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
  pub payment: Payment,
  pub fee:     FeeQuote,
  /// Whether an earlier, short payment was topped up.
  pub top_up:  bool,
}

impl<S: ParkingStore> ParkingEngine<S> {
  /// Settle the session's current fee.
  ///
  /// A session has at most one settled payment. If the fee has since grown
  /// past it (overstay), `amount` is added to it; such top-ups cannot bring a
  /// new discount code.
  pub async fn settle_payment(&self, req: SettleRequest) -> Result<PaymentReceipt> {
    let now = self.now();
    if req.amount < Decimal::ZERO {
      return Err(Error::InvalidInput("payment amount must not be negative".into()));
    }

    let session = self.get_session(req.session_id).await?;
    if !session.is_active() {
      return Err(Error::InvalidState(format!(
        "session {} is {}",
        session.session_id, session.status
      )));
    }

    let settled = self.store.settled_payment(session.session_id).await.map_err(Error::store)?;
    let code = req.discount_code.as_deref().map(normalize_code).filter(|c| !c.is_empty());
    let source = match (&code, &settled) {
      (Some(_), Some(_)) => {
        return Err(Error::InvalidState(
          "a discount code cannot be applied to a top-up".into(),
        ));
      }
      (Some(code), None) => DiscountSource::Code(code),
      (None, settled) => Self::redeemed(settled.as_ref()),
    };

    let pricing = self.pricing(&session, now, source).await?;
    let fee = self.quote(&session, &pricing, now - session.entry_time, now)?;
    if settled.as_ref().is_some_and(|p| p.amount >= fee.total) {
      return Err(Error::AlreadySettled(session.session_id));
    }

    let settlement = Settlement {
      payment_id:    Uuid::now_v7(),
      session_id:    session.session_id,
      amount:        req.amount,
      fee_due:       fee.total,
      discount_code: code.clone(),
      receipt:       token::receipt(),
      at:            now,
    };
    match self.store.settle_payment(settlement).await.map_err(Error::store)? {
      SettleOutcome::Settled(payment) => {
        info!(
          session_id = %session.session_id,
          receipt = %payment.receipt,
          amount = %payment.amount,
          fee = %fee.total,
          "payment settled"
        );
        Ok(PaymentReceipt { payment, fee, top_up: false })
      }
      SettleOutcome::ToppedUp(payment) => {
        info!(
          session_id = %session.session_id,
          receipt = %payment.receipt,
          amount = %payment.amount,
          fee = %fee.total,
          "payment topped up"
        );
        Ok(PaymentReceipt { payment, fee, top_up: true })
      }
      SettleOutcome::AlreadySettled(_) => Err(Error::AlreadySettled(session.session_id)),
      SettleOutcome::Insufficient { due, paid } => Err(Error::PaymentRequired { due, paid }),
      SettleOutcome::DiscountRejected(reason) => {
        let code = code.unwrap_or_default();
        warn!(%code, %reason, session_id = %session.session_id, "discount rejected at settlement");
        Err(Error::DiscountInvalid { code, reason })
      }
      SettleOutcome::NotActive(status) => Err(Error::InvalidState(format!(
        "session {} is {status}",
        session.session_id
      ))),
      SettleOutcome::NotFound => Err(Error::SessionNotFound(session.session_id)),
    }
  }
}
