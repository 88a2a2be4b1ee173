//! The single source of "now" for the engine.

use std::sync::{
  Arc,
  atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
  micros: Arc<AtomicI64>,
}

impl ManualClock {
  pub fn new(at: DateTime<Utc>) -> Self {
    Self { micros: Arc::new(AtomicI64::new(at.timestamp_micros())) }
  }

  pub fn set(&self, at: DateTime<Utc>) {
    self.micros.store(at.timestamp_micros(), Ordering::SeqCst);
  }

  pub fn advance(&self, by: TimeDelta) {
    let step = by.num_microseconds().unwrap_or(i64::MAX);
    self.micros.fetch_add(step, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst))
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn manual_clock_clones_share_time() {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    let other = clock.clone();

    clock.advance(TimeDelta::minutes(90));
    assert_eq!(other.now(), start + TimeDelta::minutes(90));

    other.set(start);
    assert_eq!(clock.now(), start);
  }
}
