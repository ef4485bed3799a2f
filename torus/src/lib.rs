//! Lock-free inter-thread messaging over a pre-allocated ring.
//!
//! torus moves fixed-type events from producer threads to consumer
//! threads with minimal coordination: no locks, no allocation and no
//! error paths on the hot side, only release/acquire sequence counters.
//!
//! ## Components
//!
//! | Component | Type | Role |
//! |-----------|------|------|
//! | Ring | [`RingBuffer<E>`] | Pre-allocated power-of-two slot storage |
//! | Sequence | [`Sequence`] | Padded monotonic publication counter |
//! | Sequencer | [`SingleProducerSequencer`], [`MultiProducerSequencer`] | Claim/publish protocol, gating on the slowest consumer |
//! | Barrier | [`SequenceBarrier`] | Consumer wait point over cursor + upstream consumers |
//! | Processor | [`BatchEventProcessor`] | Consumer run loop with batching and error routing |
//! | Wait strategy | [`wait_strategy`] | Parking policy for empty (consumer) and full (producer) ring |
//!
//! ## Data flow
//!
//! A producer claims sequences with `next()`, mutates the claimed slots
//! in place and makes them visible with `publish()`. A processor asks
//! its barrier for the highest consumable sequence, hands the contiguous
//! batch to an [`EventHandler`] and advances its own sequence, which in
//! turn gates future producer claims.
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use torus::{BatchEventProcessor, EventHandler, HandlerResult, RingBuffer, Sequencer,
//!             SingleProducerSequencer};
//! use torus::wait_strategy::BusySpinWaitStrategy;
//!
//! struct Sum(i64);
//!
//! impl EventHandler<i64> for Sum {
//!     fn on_batch(&mut self, batch: &[i64], _start: i64) -> HandlerResult {
//!         self.0 += batch.iter().sum::<i64>();
//!         Ok(())
//!     }
//! }
//!
//! let ring = Arc::new(RingBuffer::<i64>::new(8)?);
//! let sequencer = Arc::new(SingleProducerSequencer::new(8, BusySpinWaitStrategy::new())?);
//! let mut processor = BatchEventProcessor::new(ring.clone(), sequencer.new_barrier(&[]), Sum(0));
//! sequencer.add_gating_sequences(&[processor.sequence()]);
//!
//! let handle = processor.handle();
//! let consumer = thread::spawn(move || processor.run());
//!
//! for value in 1..=20 {
//!     let seq = sequencer.next(1);
//!     unsafe { *ring.get_mut(seq) = value; }
//!     sequencer.publish(seq);
//! }
//!
//! while handle.sequence().get() < 19 {
//!     thread::yield_now();
//! }
//! handle.halt();
//! consumer.join().unwrap()?;
//! # Ok::<(), torus::TorusError>(())
//! ```

pub mod barrier;
pub mod constants;
pub mod error;
pub mod handler;
pub mod processor;
pub mod ring;
pub mod sequence;
pub mod sequencer;
pub mod wait_strategy;

pub use barrier::SequenceBarrier;
pub use error::{HandlerError, Result, TorusError};
pub use handler::{
    EventHandler, ExceptionHandler, FatalExceptionHandler, HandlerResult, IgnoreExceptionHandler,
};
#[cfg(feature = "async")]
pub use processor::{AsyncBatchEventProcessor, AsyncEventHandler};
pub use processor::{BatchEventProcessor, ProcessorHandle, RunState};
pub use ring::RingBuffer;
pub use sequence::{minimum_sequence, Sequence, SequenceGroup};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};

use std::time::Duration;

use crate::constants::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_RING_SIZE};

/// How many threads publish into the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerMode {
    /// Exactly one producer thread; claims skip the CAS.
    Single,
    /// Any number of producer threads.
    Multi,
}

/// Wait strategy selection for a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategyKind {
    /// Tight poll; lowest latency, a full core per waiter.
    BusySpin,
    /// Spin, then yield, then short parks.
    Yielding,
    /// Spin, then exponential-backoff sleeps; lowest CPU.
    Sleeping,
    /// Condition variable, woken on publish.
    Blocking,
    /// Condition variable with a deadline; consumers hear `on_timeout`
    /// when the wait expires.
    TimeoutBlocking(Duration),
}

/// Validated topology parameters.
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Number of slots (power of 2)
    pub size: usize,
    /// Producer mode the sequencer is built for
    pub producer_mode: ProducerMode,
    /// Consumer parking policy
    pub wait_strategy: WaitStrategyKind,
    /// Per-processor cap on events delivered per batch
    pub max_batch_size: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_RING_SIZE,
            producer_mode: ProducerMode::Single,
            wait_strategy: WaitStrategyKind::BusySpin,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl RingConfig {
    /// Create a configuration with the given ring size.
    pub fn new(size: usize) -> Result<Self> {
        if !size.is_power_of_two() {
            return Err(TorusError::config("Ring size must be a power of 2"));
        }
        Ok(Self {
            size,
            ..Default::default()
        })
    }

    pub fn with_producer_mode(mut self, mode: ProducerMode) -> Self {
        self.producer_mode = mode;
        self
    }

    pub fn with_wait_strategy(mut self, kind: WaitStrategyKind) -> Self {
        self.wait_strategy = kind;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Result<Self> {
        if max_batch_size < 1 {
            return Err(TorusError::config("Max batch size must be at least 1"));
        }
        self.max_batch_size = max_batch_size;
        Ok(self)
    }
}
