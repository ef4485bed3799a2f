//! Tuning constants used by the ring and wait strategies.

/// Default ring buffer size (must be power of 2)
pub const DEFAULT_RING_SIZE: usize = 65_536;

/// Cache line size for alignment (64 bytes on most CPUs, 128 on some ARM)
pub const CACHE_LINE_SIZE: usize = 64;

/// Default maximum number of events delivered to a handler per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 2048;

/// Spin iterations before a strategy starts yielding
pub const SPIN_TRIES: u32 = 100;

/// Yield iterations before a strategy starts sleeping
pub const YIELD_TRIES: u32 = 10;

/// Initial sleep for the backoff ladder of the sleeping strategy
pub const MIN_SLEEP_NANOS: u64 = 1_000;

/// Backoff cap for the sleeping strategy (1ms)
pub const MAX_SLEEP_NANOS: u64 = 1_000_000;
