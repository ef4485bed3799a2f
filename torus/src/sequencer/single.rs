//! Single-producer sequencer: claim without CAS.

use std::cell::Cell;
use std::sync::Arc;

use crate::error::{Result, TorusError};
use crate::sequence::{Sequence, SequenceGroup};
use crate::sequencer::Sequencer;
use crate::wait_strategy::WaitStrategy;

/// Sequencer for exactly one producer thread.
///
/// Claim-side state lives in plain `Cell`s: with a single claimant there
/// is nothing to synchronize until publish, which is a release store on
/// the cursor. Calling `next`/`try_next`/`publish` from more than one
/// thread is a contract violation and is not detected.
pub struct SingleProducerSequencer<W: WaitStrategy> {
    buffer_size: usize,
    cursor: Arc<Sequence>,
    next_value: Cell<i64>,
    cached_gating: Cell<i64>,
    gating: SequenceGroup,
    wait_strategy: W,
}

// SAFETY: the Cell fields are touched only by the single producer thread
// per the type's contract; every other field is an atomic or a lock.
unsafe impl<W: WaitStrategy> Sync for SingleProducerSequencer<W> {}

impl<W: WaitStrategy> SingleProducerSequencer<W> {
    pub fn new(buffer_size: usize, wait_strategy: W) -> Result<Self> {
        if !buffer_size.is_power_of_two() {
            return Err(TorusError::config("Ring size must be a power of 2"));
        }

        Ok(Self {
            buffer_size,
            cursor: Arc::new(Sequence::default()),
            next_value: Cell::new(Sequence::INITIAL),
            cached_gating: Cell::new(Sequence::INITIAL),
            gating: SequenceGroup::new(),
            wait_strategy,
        })
    }

    fn has_available_capacity(&self, n: usize) -> bool {
        let next = self.next_value.get() + n as i64;
        let wrap_point = next - self.buffer_size as i64;
        let cached = self.cached_gating.get();

        if wrap_point > cached || cached > self.next_value.get() {
            let min_sequence = self.gating.minimum(self.next_value.get());
            self.cached_gating.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl<W: WaitStrategy> Sequencer for SingleProducerSequencer<W> {
    type Wait = W;

    fn next(&self, n: usize) -> i64 {
        assert!(
            n >= 1 && n <= self.buffer_size,
            "claim of {} slots from a ring of {}",
            n,
            self.buffer_size
        );

        let next_value = self.next_value.get();
        let next = next_value + n as i64;
        let wrap_point = next - self.buffer_size as i64;
        let cached = self.cached_gating.get();

        if wrap_point > cached || cached > next_value {
            let mut min_sequence = self.gating.minimum(next_value);
            while wrap_point > min_sequence {
                self.wait_strategy.park_producer();
                min_sequence = self.gating.minimum(next_value);
            }
            self.cached_gating.set(min_sequence);
        }

        self.next_value.set(next);
        next
    }

    fn try_next(&self, n: usize) -> Result<i64> {
        assert!(
            n >= 1 && n <= self.buffer_size,
            "claim of {} slots from a ring of {}",
            n,
            self.buffer_size
        );

        if !self.has_available_capacity(n) {
            return Err(TorusError::InsufficientCapacity);
        }

        let next = self.next_value.get() + n as i64;
        self.next_value.set(next);
        Ok(next)
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _lo: i64, hi: i64) {
        self.publish(hi);
    }

    #[inline]
    fn is_available(&self, sequence: i64) -> bool {
        sequence <= self.cursor.get()
    }

    /// The cursor only ever advances contiguously with one producer, so
    /// the whole reported range is already published.
    #[inline]
    fn highest_published(&self, _lo: i64, available: i64) -> i64 {
        available
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.next_value.get();
        let consumed = self.gating.minimum(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn cursor(&self) -> Arc<Sequence> {
        self.cursor.clone()
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn wait_strategy(&self) -> &W {
        &self.wait_strategy
    }

    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.gating.add_all(sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating.remove(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait_strategy::BusySpinWaitStrategy;

    fn sequencer(size: usize) -> SingleProducerSequencer<BusySpinWaitStrategy> {
        SingleProducerSequencer::new(size, BusySpinWaitStrategy::new()).unwrap()
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(SingleProducerSequencer::new(6, BusySpinWaitStrategy::new()).is_err());
    }

    #[test]
    fn test_cursor_starts_unpublished() {
        let s = sequencer(16);
        assert_eq!(s.cursor().get(), Sequence::INITIAL);
        assert!(!s.is_available(0));
    }

    #[test]
    fn test_claim_and_publish() {
        let s = sequencer(16);
        assert_eq!(s.next(1), 0);
        s.publish(0);
        assert!(s.is_available(0));
        assert!(!s.is_available(1));

        // Batch claim returns the high end of the range
        assert_eq!(s.next(4), 4);
        s.publish_range(1, 4);
        assert_eq!(s.cursor().get(), 4);
    }

    #[test]
    fn test_try_next_refuses_when_full() {
        let consumer = Arc::new(Sequence::default());
        let s = sequencer(4);
        s.add_gating_sequences(&[consumer.clone()]);

        for i in 0..4 {
            let seq = s.try_next(1).unwrap();
            assert_eq!(seq, i);
            s.publish(seq);
        }
        // Consumer has not moved: the ring is full
        let err = s.try_next(1).unwrap_err();
        assert!(matches!(err, TorusError::InsufficientCapacity));

        consumer.set(0);
        assert_eq!(s.try_next(1).unwrap(), 4);
    }

    #[test]
    fn test_remaining_capacity_tracks_consumer() {
        let consumer = Arc::new(Sequence::default());
        let s = sequencer(8);
        s.add_gating_sequences(&[consumer.clone()]);
        assert_eq!(s.remaining_capacity(), 8);

        let seq = s.next(3);
        s.publish(seq);
        assert_eq!(s.remaining_capacity(), 5);

        consumer.set(2);
        assert_eq!(s.remaining_capacity(), 8);
    }

    #[test]
    fn test_wrap_blocks_until_gating_advances() {
        use std::thread;
        use std::time::Duration;

        let consumer = Arc::new(Sequence::default());
        let s = Arc::new(sequencer(4));
        s.add_gating_sequences(&[consumer.clone()]);

        let hi = s.next(4);
        s.publish_range(0, hi);

        let s2 = s.clone();
        let claimer = thread::spawn(move || s2.next(1));

        // The claim cannot complete while the consumer sits at -1.
        thread::sleep(Duration::from_millis(20));
        consumer.set(0);
        assert_eq!(claimer.join().unwrap(), 4);
    }

    #[test]
    fn test_highest_published_passthrough() {
        let s = sequencer(8);
        assert_eq!(s.highest_published(0, 5), 5);
    }

    #[test]
    fn test_remove_gating_sequence() {
        let s = sequencer(8);
        let gate = Arc::new(Sequence::default());
        s.add_gating_sequences(&[gate.clone()]);
        assert!(s.remove_gating_sequence(&gate));
        assert!(!s.remove_gating_sequence(&gate));
    }
}
