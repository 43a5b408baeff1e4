//! Timestamp source for record metadata.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Wall clock that never repeats or goes backwards.
///
/// Timestamps are truncated to microseconds (what survives an ISO-8601 round
/// trip through storage) and each call returns at least one microsecond more
/// than the previous one.
#[derive(Debug, Default)]
pub struct MonotonicClock {
  last_micros: AtomicI64,
}

impl MonotonicClock {
  pub fn new() -> Self { Self::default() }

  pub fn now(&self) -> DateTime<Utc> {
    let wall = Utc::now().timestamp_micros();
    let mut prev = self.last_micros.load(Ordering::Relaxed);
    loop {
      let next = wall.max(prev + 1);
      match self.last_micros.compare_exchange_weak(
        prev,
        next,
        Ordering::AcqRel,
        Ordering::Relaxed,
      ) {
        Ok(_) => {
          return DateTime::from_timestamp_micros(next).unwrap_or_default();
        }
        Err(actual) => prev = actual,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  #[test]
  fn strictly_increasing() {
    let clock = MonotonicClock::new();
    let mut last = clock.now();
    for _ in 0..1000 {
      let next = clock.now();
      assert!(next > last);
      last = next;
    }
  }

  #[test]
  fn strictly_increasing_across_threads() {
    let clock = Arc::new(MonotonicClock::new());
    let handles: Vec<_> = (0..4)
      .map(|_| {
        let clock = clock.clone();
        std::thread::spawn(move || (0..500).map(|_| clock.now()).collect::<Vec<_>>())
      })
      .collect();
    let mut all: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total, "no timestamp handed out twice");
  }
}
