//! Padded atomic sequence counters.
//!
//! A `Sequence` tags each publication with a monotonically increasing
//! 64-bit position. Producers release-store their progress into it and
//! consumers acquire-load it, which is the only happens-before edge the
//! slot protocol relies on. The cell is padded to 128 bytes on both
//! sides so neighbouring counters never share a cache line.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Cache-line padded atomic sequence counter.
///
/// Starts at `-1` ("nothing published yet"); valid positions are
/// non-negative and strictly increasing.
#[repr(align(128))]
pub struct Sequence {
    value: AtomicI64,
    _padding: [u8; 120], // 128 - 8 bytes for AtomicI64
}

impl Sequence {
    /// Value of a sequence before anything has been published through it
    pub const INITIAL: i64 = -1;

    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
            _padding: [0; 120],
        }
    }

    /// Acquire-ordered read, pairs with [`Sequence::set`] on another thread.
    #[inline(always)]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Relaxed read. Only meaningful from the thread that owns the counter.
    #[inline(always)]
    pub fn get_relaxed(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Release-ordered store. Single mutator per counter.
    #[inline(always)]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// CAS used by the multi-producer claim loop. Acquire on observe,
    /// release on publish.
    #[inline(always)]
    pub fn compare_and_set(&self, current: i64, new: i64) -> bool {
        self.value
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(Self::INITIAL)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&self.get()).finish()
    }
}

/// Minimum over a set of sequences, floored at `default`.
///
/// Returns `default` when the slice is empty.
#[inline]
pub fn minimum_sequence(sequences: &[Arc<Sequence>], default: i64) -> i64 {
    sequences
        .iter()
        .fold(default, |min, seq| min.min(seq.get()))
}

/// Registry of consumer sequences a sequencer gates on.
///
/// Mutated only during topology setup and teardown; producers read a
/// snapshot on the claim slow path (wrap check), never on publish.
#[derive(Default)]
pub struct SequenceGroup {
    sequences: RwLock<Vec<Arc<Sequence>>>,
}

impl SequenceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sequence: Arc<Sequence>) {
        self.sequences.write().push(sequence);
    }

    pub fn add_all(&self, sequences: &[Arc<Sequence>]) {
        self.sequences.write().extend_from_slice(sequences);
    }

    /// Remove by identity. Returns false when the sequence was not registered.
    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let mut guard = self.sequences.write();
        if let Some(index) = guard.iter().position(|s| Arc::ptr_eq(s, sequence)) {
            guard.remove(index);
            true
        } else {
            false
        }
    }

    /// Minimum registered sequence, or `default` when the group is empty.
    pub fn minimum(&self, default: i64) -> i64 {
        minimum_sequence(&self.sequences.read(), default)
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.sequences.read().len()
    }
}
