//! Consumer-side wait point.
//!
//! A barrier gates one consumer (or a set of peers) on the sequencer's
//! cursor plus the sequences of any upstream consumers it depends on.
//! It also carries the alert flag, the cooperative cancellation channel
//! a processor uses to interrupt a parked wait on halt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TorusError};
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;
use crate::wait_strategy::WaitStrategy;

pub struct SequenceBarrier<S: Sequencer> {
    sequencer: Arc<S>,
    cursor: Arc<Sequence>,
    dependents: Vec<Arc<Sequence>>,
    alerted: AtomicBool,
}

impl<S: Sequencer> SequenceBarrier<S> {
    pub fn new(sequencer: Arc<S>, dependents: Vec<Arc<Sequence>>) -> Self {
        let cursor = sequencer.cursor();
        Self {
            sequencer,
            cursor,
            dependents,
            alerted: AtomicBool::new(false),
        }
    }

    /// Wait until `sequence` is consumable and return the highest
    /// contiguously published sequence at or beyond it.
    ///
    /// The return value can be below `sequence` when a multi-producer
    /// cursor has advanced past it but the slot itself is not yet marked
    /// published; the caller must not consume in that case and simply
    /// waits again.
    pub fn wait_for(&self, sequence: i64) -> Result<i64> {
        if self.alerted.load(Ordering::Acquire) {
            return Err(TorusError::Alert);
        }

        let available = self.sequencer.wait_strategy().wait_for(
            sequence,
            &self.cursor,
            &self.dependents,
            &self.alerted,
        )?;

        if available < sequence {
            return Ok(available);
        }
        Ok(self.sequencer.highest_published(sequence, available))
    }

    /// Raise the alert and wake any parked waiter. Idempotent.
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.sequencer.wait_strategy().signal_all_when_blocking();
    }

    /// Lower the alert; called by a processor on (re)start.
    pub fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// Current value of the producer cursor this barrier watches.
    pub fn cursor_value(&self) -> i64 {
        self.cursor.get()
    }
}

#[cfg(feature = "async")]
impl<S: Sequencer> SequenceBarrier<S> {
    /// Cooperative counterpart of [`wait_for`](Self::wait_for): a bounded
    /// spin burst, then yields back to the scheduler between polls
    /// instead of parking the thread.
    pub async fn wait_for_async(&self, sequence: i64) -> Result<i64> {
        use crate::constants::SPIN_TRIES;
        use crate::sequence::minimum_sequence;

        let mut spins = 0u32;
        loop {
            if self.alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alert);
            }

            let available = minimum_sequence(&self.dependents, self.cursor.get());
            if available >= sequence {
                return Ok(self.sequencer.highest_published(sequence, available));
            }

            if spins < SPIN_TRIES {
                spins += 1;
                std::hint::spin_loop();
            } else {
                tokio::task::yield_now().await;
            }
        }
    }
}
