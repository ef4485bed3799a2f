//! Wait strategies for ring buffer consumers.
//!
//! A strategy controls how a consumer parks while the sequence it needs
//! is not yet published, and how a producer parks while the ring is
//! full. Each variant trades latency against CPU usage:
//!
//! | Strategy | Latency | CPU |
//! |----------|---------|-----|
//! | `BusySpinWaitStrategy` | lowest | 100% of a core |
//! | `YieldingWaitStrategy` | low | moderate |
//! | `SleepingWaitStrategy` | higher | lowest |
//! | `BlockingWaitStrategy` | moderate | near zero when idle |
//! | `TimeoutBlockingWaitStrategy` | moderate | near zero, bounded waits |
//!
//! Every strategy re-checks the alert flag between waits, so a barrier
//! can interrupt a parked consumer synchronously on halt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::constants::{MAX_SLEEP_NANOS, MIN_SLEEP_NANOS, SPIN_TRIES, YIELD_TRIES};
use crate::error::{Result, TorusError};
use crate::sequence::{minimum_sequence, Sequence};

/// Trait for wait strategies that determine how threads park.
pub trait WaitStrategy: Send + Sync + 'static {
    /// Block until `min(cursor, min(dependents)) >= sequence`.
    ///
    /// Returns the observed minimum (which may exceed `sequence`),
    /// `Err(TorusError::Alert)` when the alert flag is raised, or
    /// `Err(TorusError::Timeout)` from deadline-bounded variants.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64>;

    /// Wake blocked consumers. Called by sequencers on publish and by
    /// barriers on alert; a no-op for non-blocking strategies.
    fn signal_all_when_blocking(&self) {}

    /// Brief producer-side park while the ring is full.
    #[inline]
    fn park_producer(&self) {
        std::hint::spin_loop();
    }
}

/// Highest sequence safe to consume right now: the slowest of the
/// producer cursor and any upstream consumers.
#[inline(always)]
fn observed_minimum(cursor: &Sequence, dependents: &[Arc<Sequence>]) -> i64 {
    minimum_sequence(dependents, cursor.get())
}

/// Busy spin wait strategy - lowest latency, highest CPU usage.
#[derive(Default)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alert);
            }
            let available = observed_minimum(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            std::hint::spin_loop();
        }
    }
}

/// Yielding wait strategy - a bounded burst of spins, then cooperative
/// yields, then short parks.
pub struct YieldingWaitStrategy {
    spin_tries: u32,
    yield_tries: u32,
}

impl YieldingWaitStrategy {
    pub fn new() -> Self {
        Self {
            spin_tries: SPIN_TRIES,
            yield_tries: YIELD_TRIES,
        }
    }

    pub fn with_tries(spin_tries: u32, yield_tries: u32) -> Self {
        Self {
            spin_tries,
            yield_tries,
        }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = 0u32;
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alert);
            }
            let available = observed_minimum(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            if counter < self.spin_tries {
                std::hint::spin_loop();
            } else if counter < self.spin_tries + self.yield_tries {
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_nanos(1));
            }
            counter = counter.saturating_add(1);
        }
    }

    #[inline]
    fn park_producer(&self) {
        thread::yield_now();
    }
}

/// Sleeping wait strategy - spins, then yields, then sleeps with
/// exponential backoff bounded by a cap. Lowest CPU usage.
pub struct SleepingWaitStrategy {
    spin_tries: u32,
    yield_tries: u32,
    max_sleep_nanos: u64,
}

impl SleepingWaitStrategy {
    pub fn new() -> Self {
        Self {
            spin_tries: SPIN_TRIES,
            yield_tries: YIELD_TRIES,
            max_sleep_nanos: MAX_SLEEP_NANOS,
        }
    }

    /// Cap the backoff ladder at `max_sleep`.
    pub fn with_max_sleep(max_sleep: Duration) -> Self {
        Self {
            max_sleep_nanos: (max_sleep.as_nanos() as u64).max(MIN_SLEEP_NANOS),
            ..Self::new()
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = 0u32;
        let mut sleep_nanos = MIN_SLEEP_NANOS;
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alert);
            }
            let available = observed_minimum(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            if counter < self.spin_tries {
                std::hint::spin_loop();
                counter += 1;
            } else if counter < self.spin_tries + self.yield_tries {
                thread::yield_now();
                counter += 1;
            } else {
                thread::sleep(Duration::from_nanos(sleep_nanos));
                sleep_nanos = (sleep_nanos * 2).min(self.max_sleep_nanos);
            }
        }
    }

    #[inline]
    fn park_producer(&self) {
        thread::yield_now();
    }
}

/// Blocking wait strategy - parks on a condition variable until the
/// sequencer signals a publish. Balanced latency and CPU usage.
#[derive(Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park until the producer cursor reaches `sequence` or an alert fires.
    fn block_on_cursor(
        &self,
        sequence: i64,
        cursor: &Sequence,
        alerted: &AtomicBool,
    ) -> Result<()> {
        if cursor.get() >= sequence {
            return Ok(());
        }
        let mut guard = self.mutex.lock();
        while cursor.get() < sequence {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alert);
            }
            self.condvar.wait(&mut guard);
        }
        Ok(())
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        self.block_on_cursor(sequence, cursor, alerted)?;

        // Upstream consumers advance without signalling; spin them in.
        let mut available = observed_minimum(cursor, dependents);
        while available < sequence {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alert);
            }
            std::hint::spin_loop();
            available = observed_minimum(cursor, dependents);
        }
        Ok(available)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    #[inline]
    fn park_producer(&self) {
        thread::yield_now();
    }
}

/// Blocking wait strategy with a deadline. Returns
/// `Err(TorusError::Timeout)` when the wait expires, which processors
/// surface to the handler as an `on_timeout` notification.
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let deadline = Instant::now() + self.timeout;

        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                if alerted.load(Ordering::Acquire) {
                    return Err(TorusError::Alert);
                }
                if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                    if cursor.get() >= sequence {
                        break;
                    }
                    return Err(TorusError::Timeout);
                }
            }
        }

        let mut available = observed_minimum(cursor, dependents);
        while available < sequence {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alert);
            }
            if Instant::now() >= deadline {
                return Err(TorusError::Timeout);
            }
            std::hint::spin_loop();
            available = observed_minimum(cursor, dependents);
        }
        Ok(available)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    #[inline]
    fn park_producer(&self) {
        thread::yield_now();
    }
}
