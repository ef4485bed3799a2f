//! Pre-allocated slot storage.
//!
//! `RingBuffer<E>` owns `N` slots (`N` a power of two) that are
//! constructed once and reused for the life of the topology. A sequence
//! `s` maps to slot `s & (N - 1)`. The buffer itself performs no
//! synchronization: ownership of a slot moves between producer and
//! consumers purely through the sequencer protocol.
//!
//! Two storage backends:
//! - `new()` / `with_factory()` - heap allocation
//! - `new_mapped()` - anonymous mmap with mlock (no page faults on the hot path)

use std::ptr;

use crate::error::{Result, TorusError};

pub struct RingBuffer<E> {
    slots: *mut E,
    size: usize,
    mask: usize,
    _heap: Option<Box<[E]>>,
    mapped: bool,
}

impl<E> RingBuffer<E> {
    /// Create with heap allocation, filling slots with `E::default()`.
    pub fn new(size: usize) -> Result<Self>
    where
        E: Default,
    {
        Self::with_factory(size, |_| E::default())
    }

    /// Create with heap allocation, constructing each slot from its index.
    pub fn with_factory<F>(size: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> E,
    {
        if !size.is_power_of_two() {
            return Err(TorusError::config("Ring size must be a power of 2"));
        }

        let buffer: Box<[E]> = (0..size).map(&mut factory).collect::<Vec<_>>().into_boxed_slice();
        let ptr = buffer.as_ptr() as *mut E;

        Ok(Self {
            slots: ptr,
            size,
            mask: size - 1,
            _heap: Some(buffer),
            mapped: false,
        })
    }

    /// Create with memory-mapped, mlocked storage.
    ///
    /// Slots are constructed in place with `E::default()`. The mapping is
    /// locked into RAM so consuming a slot never takes a page fault.
    pub fn new_mapped(size: usize) -> Result<Self>
    where
        E: Default,
    {
        if !size.is_power_of_two() {
            return Err(TorusError::config("Ring size must be a power of 2"));
        }

        let byte_len = size
            .checked_mul(std::mem::size_of::<E>())
            .ok_or_else(|| TorusError::config("Ring byte size overflow"))?;

        let ptr = unsafe {
            let p = libc::mmap(
                ptr::null_mut(),
                byte_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if p == libc::MAP_FAILED {
                return Err(TorusError::config("mmap failed"));
            }
            let _ = libc::mlock(p, byte_len);
            let slots = p as *mut E;
            for i in 0..size {
                ptr::write(slots.add(i), E::default());
            }
            slots
        };

        Ok(Self {
            slots: ptr,
            size,
            mask: size - 1,
            _heap: None,
            mapped: true,
        })
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline(always)]
    fn index(&self, sequence: i64) -> usize {
        (sequence as usize) & self.mask
    }

    /// Mutable access to the slot for `sequence`.
    ///
    /// # Safety
    ///
    /// The sequence must be claimed and not yet published, so that this
    /// producer holds exclusive ownership of the slot.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)] // exclusivity comes from the claim protocol
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut E {
        &mut *self.slots.add(self.index(sequence))
    }

    /// Shared access to the slot for `sequence`.
    ///
    /// Valid once the sequencer reports the sequence available; until all
    /// gating consumers pass it, no producer will touch the slot again.
    #[inline(always)]
    pub fn get(&self, sequence: i64) -> &E {
        unsafe { &*self.slots.add(self.index(sequence)) }
    }

    /// Contiguous run of published slots starting at `lo`, up to `hi`
    /// inclusive, truncated at the physical end of the ring. Never wraps
    /// within one slice, so `slice[i]` always corresponds to `lo + i`.
    #[inline(always)]
    pub fn slice(&self, lo: i64, hi: i64) -> &[E] {
        debug_assert!(lo <= hi, "slice: lo {} > hi {}", lo, hi);
        let start = self.index(lo);
        let run = ((hi - lo + 1) as usize).min(self.size - start);
        unsafe { std::slice::from_raw_parts(self.slots.add(start), run) }
    }
}

impl<E> Drop for RingBuffer<E> {
    fn drop(&mut self) {
        if self.mapped && !self.slots.is_null() {
            unsafe {
                for i in 0..self.size {
                    ptr::drop_in_place(self.slots.add(i));
                }
                libc::munmap(
                    self.slots as *mut libc::c_void,
                    self.size * std::mem::size_of::<E>(),
                );
            }
        }
    }
}

// SAFETY: slot ownership transfers between threads only through the
// sequencer's claim/publish protocol; the release/acquire pair on the
// cursor (or availability buffer) orders every slot write before any read.
unsafe impl<E: Send + Sync> Send for RingBuffer<E> {}
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_size_rejected() {
        assert!(RingBuffer::<u64>::new(0).is_err());
        assert!(RingBuffer::<u64>::new(1000).is_err());
        assert!(RingBuffer::<u64>::new(8).is_ok());
        assert!(RingBuffer::<u64>::new(1).is_ok());
    }

    #[test]
    fn test_factory_fills_slots() {
        let ring = RingBuffer::with_factory(8, |i| i as u64 * 10).unwrap();
        assert_eq!(*ring.get(0), 0);
        assert_eq!(*ring.get(3), 30);
        // Sequence 11 wraps onto slot 3
        assert_eq!(*ring.get(11), 30);
    }

    #[test]
    fn test_write_then_read_in_place() {
        let ring = RingBuffer::<u64>::new(4).unwrap();
        unsafe {
            *ring.get_mut(5) = 99;
        }
        assert_eq!(*ring.get(5), 99);
        assert_eq!(*ring.get(1), 99); // same slot, 5 & 3 == 1
    }

    #[test]
    fn test_slice_truncates_at_wrap() {
        let ring = RingBuffer::with_factory(8, |i| i as u64).unwrap();

        let full = ring.slice(0, 7);
        assert_eq!(full.len(), 8);

        // 6..=10 crosses the physical end: only 6 and 7 are contiguous
        let run = ring.slice(6, 10);
        assert_eq!(run.len(), 2);
        assert_eq!(run[0], 6);
        assert_eq!(run[1], 7);

        // The remainder starts back at slot 0
        let rest = ring.slice(8, 10);
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0], 0);
    }

    #[test]
    fn test_mapped_ring() {
        let ring = RingBuffer::<u64>::new_mapped(16).unwrap();
        unsafe {
            *ring.get_mut(2) = 7;
        }
        assert_eq!(*ring.get(2), 7);
        assert_eq!(*ring.get(3), 0);
    }
}
