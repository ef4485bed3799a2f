//! Multi-producer sequencer: CAS claim plus per-slot availability.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{Result, TorusError};
use crate::sequence::{Sequence, SequenceGroup};
use crate::sequencer::Sequencer;
use crate::wait_strategy::WaitStrategy;

/// Sequencer safe for any number of producer threads.
///
/// The CAS on the cursor only proves that *someone* reserved a range; it
/// says nothing about whether earlier claimants finished writing their
/// slots. Publication is therefore recorded per slot: entry `i` of the
/// availability buffer holds the wrap count (`sequence >> log2(N)`) of
/// the most recent publish into slot `i`. Storing the wrap count rather
/// than a flag means no reset on wrap and no ABA across laps.
pub struct MultiProducerSequencer<W: WaitStrategy> {
    buffer_size: usize,
    index_mask: usize,
    index_shift: u32,
    cursor: Arc<Sequence>,
    cached_gating: Sequence,
    gating: SequenceGroup,
    available: Box<[AtomicI64]>,
    wait_strategy: W,
}

impl<W: WaitStrategy> MultiProducerSequencer<W> {
    pub fn new(buffer_size: usize, wait_strategy: W) -> Result<Self> {
        if !buffer_size.is_power_of_two() {
            return Err(TorusError::config("Ring size must be a power of 2"));
        }

        let available = (0..buffer_size)
            .map(|_| AtomicI64::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            buffer_size,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
            cursor: Arc::new(Sequence::default()),
            cached_gating: Sequence::default(),
            gating: SequenceGroup::new(),
            available,
            wait_strategy,
        })
    }

    #[inline(always)]
    fn availability_flag(&self, sequence: i64) -> i64 {
        sequence >> self.index_shift
    }

    #[inline(always)]
    fn set_available(&self, sequence: i64) {
        let index = (sequence as usize) & self.index_mask;
        self.available[index].store(self.availability_flag(sequence), Ordering::Release);
    }

    fn has_available_capacity(&self, n: usize, current: i64) -> bool {
        let wrap_point = current + n as i64 - self.buffer_size as i64;
        let cached = self.cached_gating.get();

        if wrap_point > cached || cached > current {
            let min_sequence = self.gating.minimum(current);
            self.cached_gating.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl<W: WaitStrategy> Sequencer for MultiProducerSequencer<W> {
    type Wait = W;

    fn next(&self, n: usize) -> i64 {
        assert!(
            n >= 1 && n <= self.buffer_size,
            "claim of {} slots from a ring of {}",
            n,
            self.buffer_size
        );

        loop {
            let current = self.cursor.get();
            let next = current + n as i64;
            let wrap_point = next - self.buffer_size as i64;
            let cached = self.cached_gating.get();

            if wrap_point > cached || cached > current {
                let gating = self.gating.minimum(current);
                if wrap_point > gating {
                    self.wait_strategy.park_producer();
                    continue;
                }
                self.cached_gating.set(gating);
            } else if self.cursor.compare_and_set(current, next) {
                return next;
            }
        }
    }

    fn try_next(&self, n: usize) -> Result<i64> {
        assert!(
            n >= 1 && n <= self.buffer_size,
            "claim of {} slots from a ring of {}",
            n,
            self.buffer_size
        );

        loop {
            let current = self.cursor.get();
            let next = current + n as i64;

            if !self.has_available_capacity(n, current) {
                return Err(TorusError::InsufficientCapacity);
            }
            if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        for sequence in lo..=hi {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    #[inline]
    fn is_available(&self, sequence: i64) -> bool {
        let index = (sequence as usize) & self.index_mask;
        self.available[index].load(Ordering::Acquire) == self.availability_flag(sequence)
    }

    fn highest_published(&self, lo: i64, available: i64) -> i64 {
        for sequence in lo..=available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
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
