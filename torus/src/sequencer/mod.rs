//! Claim/publish coordination between producers and the ring.
//!
//! A sequencer hands out slot sequences to producers (`next` /
//! `try_next`), refuses to wrap past the slowest gating consumer, and
//! advertises published sequences to the consumer side. Two variants:
//!
//! - `SingleProducerSequencer` - one producer thread, no CAS on claim
//! - `MultiProducerSequencer` - CAS claim loop plus a per-slot
//!   availability buffer for out-of-order publication
//!
//! Consumers never talk to a sequencer directly; they go through a
//! [`SequenceBarrier`](crate::barrier::SequenceBarrier) built with
//! [`Sequencer::new_barrier`].

mod multi;
mod single;

pub use multi::MultiProducerSequencer;
pub use single::SingleProducerSequencer;

use std::sync::Arc;

use crate::barrier::SequenceBarrier;
use crate::error::Result;
use crate::sequence::Sequence;
use crate::wait_strategy::WaitStrategy;

/// Producer-side coordination surface.
pub trait Sequencer: Send + Sync + 'static {
    /// Wait strategy shared with barriers built from this sequencer.
    type Wait: WaitStrategy;

    /// Claim the next `n` sequences, parking while the ring would wrap
    /// past the slowest gating consumer. Returns the highest claimed
    /// sequence; the claim covers `returned - n + 1 ..= returned`.
    fn next(&self, n: usize) -> i64;

    /// Non-blocking claim. `Err(InsufficientCapacity)` when `n` free
    /// slots are not available right now.
    fn try_next(&self, n: usize) -> Result<i64>;

    /// Make a claimed sequence visible to consumers.
    fn publish(&self, sequence: i64);

    /// Publish every sequence in `lo..=hi`.
    fn publish_range(&self, lo: i64, hi: i64);

    /// Whether `sequence` has been published and is safe to read.
    fn is_available(&self, sequence: i64) -> bool;

    /// Collapse `[lo, available]` to the contiguous published prefix:
    /// the highest sequence in the range such that it and every lower
    /// sequence are published.
    fn highest_published(&self, lo: i64, available: i64) -> i64;

    /// Free slots left before the ring would wrap onto an unconsumed one.
    fn remaining_capacity(&self) -> i64;

    /// The published cursor: highest sequence known safe to read (for
    /// the multi-producer variant, highest *claimed*; availability is
    /// per-slot).
    fn cursor(&self) -> Arc<Sequence>;

    fn buffer_size(&self) -> usize;

    fn wait_strategy(&self) -> &Self::Wait;

    /// Register consumer sequences the producer side must not overrun.
    /// Must happen before the first publish.
    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]);

    /// Deregister a halted consumer. Returns false when the sequence was
    /// never registered.
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Build a consumer wait point over this sequencer's cursor plus any
    /// upstream consumer sequences.
    fn new_barrier(self: &Arc<Self>, dependents: &[Arc<Sequence>]) -> SequenceBarrier<Self>
    where
        Self: Sized,
    {
        SequenceBarrier::new(Arc::clone(self), dependents.to_vec())
    }
}
