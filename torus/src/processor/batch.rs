//! Batch event processor: the synchronous consumer run loop.

use std::sync::Arc;
use std::time::Duration;

use crate::barrier::SequenceBarrier;
use crate::constants::DEFAULT_MAX_BATCH_SIZE;
use crate::error::{Result, TorusError};
use crate::handler::{EventHandler, ExceptionHandler, FatalExceptionHandler};
use crate::processor::{ProcessorHandle, ProcessorShared, RunState};
use crate::ring::RingBuffer;
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;

/// Owns a consumer cursor and drives a handler from a barrier.
///
/// `run()` occupies the calling thread until the processor is halted (or
/// the exception handler escalates an event error). Control from other
/// threads goes through a [`ProcessorHandle`] taken before `run()`.
///
/// The generic parameters monomorphize the ring, barrier, handler and
/// exception handler into the loop; nothing on the hot path dispatches
/// dynamically.
pub struct BatchEventProcessor<E, S: Sequencer, H, X> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier<S>>,
    sequence: Arc<Sequence>,
    handler: H,
    exception_handler: X,
    max_batch_size: i64,
    shared: Arc<ProcessorShared>,
}

impl<E, S, H> BatchEventProcessor<E, S, H, FatalExceptionHandler>
where
    E: Send + Sync + 'static,
    S: Sequencer,
    H: EventHandler<E>,
{
    /// Create a processor with the default (fatal) exception policy.
    pub fn new(ring: Arc<RingBuffer<E>>, barrier: SequenceBarrier<S>, mut handler: H) -> Self {
        let sequence = Arc::new(Sequence::default());
        handler.set_sequence_callback(sequence.clone());
        Self {
            ring,
            barrier: Arc::new(barrier),
            sequence,
            handler,
            exception_handler: FatalExceptionHandler,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE as i64,
            shared: Arc::new(ProcessorShared::new()),
        }
    }
}

impl<E, S, H, X> BatchEventProcessor<E, S, H, X>
where
    E: Send + Sync + 'static,
    S: Sequencer,
    H: EventHandler<E>,
    X: ExceptionHandler<E>,
{
    /// Replace the exception policy.
    pub fn with_exception_handler<X2>(self, exception_handler: X2) -> BatchEventProcessor<E, S, H, X2>
    where
        X2: ExceptionHandler<E>,
    {
        BatchEventProcessor {
            ring: self.ring,
            barrier: self.barrier,
            sequence: self.sequence,
            handler: self.handler,
            exception_handler,
            max_batch_size: self.max_batch_size,
            shared: self.shared,
        }
    }

    /// Cap batches below what the barrier reports.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Result<Self> {
        if max_batch_size < 1 {
            return Err(TorusError::config("Max batch size must be at least 1"));
        }
        self.max_batch_size = max_batch_size as i64;
        Ok(self)
    }

    /// The processor's consumer cursor. Register it as a gating sequence
    /// before any producer publishes.
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

    /// Remote control usable after `run()` takes the processor away.
    pub fn handle(&self) -> ProcessorHandle<S> {
        ProcessorHandle::new(
            self.sequence.clone(),
            self.barrier.clone(),
            self.shared.clone(),
        )
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    pub fn halt(&self) {
        self.shared.halt();
        self.barrier.alert();
    }

    pub fn wait_until_started(&self, timeout: Duration) -> bool {
        self.shared.wait_started(timeout)
    }

    /// Run the consume loop on the calling thread until halted.
    ///
    /// Fails with `AlreadyRunning` when the processor is not idle. On any
    /// exit path the handler's `on_shutdown` runs and the state returns
    /// to idle, so a halted processor can be restarted and resumes from
    /// `sequence + 1`.
    pub fn run(&mut self) -> Result<()> {
        if !self.shared.try_start() {
            return Err(TorusError::AlreadyRunning);
        }
        self.barrier.clear_alert();

        if let Err(err) = self.handler.on_start() {
            self.exception_handler.handle_start_error(err);
        }
        self.shared.open_latch();

        self.process_events();

        if let Err(err) = self.handler.on_shutdown() {
            self.exception_handler.handle_shutdown_error(err);
        }
        self.shared.close_latch();
        self.shared.set_idle();
        Ok(())
    }

    fn process_events(&mut self) {
        let mut next = self.sequence.get_relaxed() + 1;

        loop {
            match self.barrier.wait_for(next) {
                Ok(available) => {
                    // A multi-producer cursor may run ahead of the slot
                    // markers; below `next` there is nothing to consume yet.
                    if available < next {
                        continue;
                    }
                    let capped = available.min(next + self.max_batch_size - 1);

                    let mut lo = next;
                    while lo <= capped {
                        let batch = self.ring.slice(lo, capped);
                        let len = batch.len() as i64;

                        if let Err(err) = self.handler.on_batch(batch, lo) {
                            match self.exception_handler.handle_event_error(err, lo, batch) {
                                Ok(()) => {} // swallowed: advance past the batch
                                Err(_) => {
                                    // Escalated: halt without advancing, so the
                                    // cursor still marks the last delivered batch.
                                    self.shared.halt();
                                    return;
                                }
                            }
                        }

                        lo += len;
                        self.sequence.set(lo - 1);
                    }
                    next = capped + 1;
                }
                Err(TorusError::Timeout) => {
                    let current = self.sequence.get_relaxed();
                    if let Err(err) = self.handler.on_timeout(current) {
                        self.exception_handler.handle_timeout_error(err, current);
                    }
                }
                Err(err) if err.is_alert() => {
                    if !self.shared.is_running() {
                        return;
                    }
                    // Transient barrier reset: re-arm and keep consuming.
                    self.barrier.clear_alert();
                }
                // The barrier surfaces nothing else.
                Err(_) => return,
            }
        }
    }
}
