//! Shared handlers and helpers for torus integration tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use torus::{EventHandler, HandlerResult};

/// Sums payloads and counts deliveries.
#[derive(Default)]
pub struct CountingHandler {
    pub sum: Arc<AtomicI64>,
    pub events: Arc<AtomicI64>,
    pub batches: Arc<AtomicI64>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sum(&self) -> i64 {
        self.sum.load(Ordering::Acquire)
    }
}

impl EventHandler<i64> for CountingHandler {
    fn on_batch(&mut self, batch: &[i64], _start: i64) -> HandlerResult {
        let mut sum = 0;
        for value in batch {
            sum += *value;
        }
        self.sum.fetch_add(sum, Ordering::AcqRel);
        self.events.fetch_add(batch.len() as i64, Ordering::AcqRel);
        self.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Records every (sequence, payload) pair it sees, for ordering and
/// exactly-once assertions.
#[derive(Default)]
pub struct CollectingHandler {
    pub seen: Arc<Mutex<Vec<(i64, i64)>>>,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventHandler<i64> for CollectingHandler {
    fn on_batch(&mut self, batch: &[i64], start: i64) -> HandlerResult {
        let mut seen = self.seen.lock().unwrap();
        for (i, value) in batch.iter().enumerate() {
            seen.push((start + i as i64, *value));
        }
        Ok(())
    }
}

/// Fails the batch containing `fail_at`; counts events delivered before
/// the failure point in each batch.
pub struct FailingHandler {
    pub fail_at: i64,
    pub delivered: Arc<AtomicI64>,
}

impl FailingHandler {
    pub fn new(fail_at: i64) -> Self {
        Self {
            fail_at,
            delivered: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl EventHandler<i64> for FailingHandler {
    fn on_batch(&mut self, batch: &[i64], start: i64) -> HandlerResult {
        for i in 0..batch.len() as i64 {
            if start + i == self.fail_at {
                return Err(format!("poisoned event at sequence {}", self.fail_at).into());
            }
            self.delivered.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

/// Sleeps on every batch to simulate a consumer that cannot keep up.
pub struct SlowHandler {
    pub delay: Duration,
    pub sum: Arc<AtomicI64>,
    pub events: Arc<AtomicI64>,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sum: Arc::new(AtomicI64::new(0)),
            events: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl EventHandler<i64> for SlowHandler {
    fn on_batch(&mut self, batch: &[i64], _start: i64) -> HandlerResult {
        std::thread::sleep(self.delay);
        for value in batch {
            self.sum.fetch_add(*value, Ordering::AcqRel);
        }
        self.events.fetch_add(batch.len() as i64, Ordering::AcqRel);
        Ok(())
    }
}

/// Counts `on_timeout` notifications and batch deliveries separately.
#[derive(Default)]
pub struct TimeoutProbe {
    pub timeouts: Arc<AtomicI64>,
    pub batches: Arc<AtomicI64>,
}

impl TimeoutProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventHandler<i64> for TimeoutProbe {
    fn on_batch(&mut self, batch: &[i64], _start: i64) -> HandlerResult {
        let _ = batch;
        self.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn on_timeout(&mut self, _sequence: i64) -> HandlerResult {
        self.timeouts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Spin until `condition` holds or `timeout` elapses. Returns whether the
/// condition was observed.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::yield_now();
    }
    condition()
}
