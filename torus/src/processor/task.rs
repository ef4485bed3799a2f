//! Async batch processor: the cooperative consumer run loop.
//!
//! Same contract as [`BatchEventProcessor`](crate::processor::BatchEventProcessor),
//! with the barrier wait and the handler calls as suspension points.
//! Each processor is one logical task that owns its cursor; `run()`
//! borrows the processor mutably, so the loop can never be re-entered
//! concurrently.

use std::sync::Arc;
use std::time::Duration;

use crate::barrier::SequenceBarrier;
use crate::constants::DEFAULT_MAX_BATCH_SIZE;
use crate::error::{Result, TorusError};
use crate::handler::{ExceptionHandler, FatalExceptionHandler, HandlerResult};
use crate::processor::{ProcessorHandle, ProcessorShared, RunState};
use crate::ring::RingBuffer;
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;

/// Async counterpart of [`EventHandler`](crate::handler::EventHandler).
#[allow(async_fn_in_trait)]
pub trait AsyncEventHandler<E>: Send {
    /// Deliver a contiguous batch; `batch[i]` is sequence `start_sequence + i`.
    async fn on_batch(&mut self, batch: &[E], start_sequence: i64) -> HandlerResult;

    async fn on_start(&mut self) -> HandlerResult {
        Ok(())
    }

    async fn on_shutdown(&mut self) -> HandlerResult {
        Ok(())
    }

    /// Called when a configured wait timeout elapses with nothing to consume.
    async fn on_timeout(&mut self, _sequence: i64) -> HandlerResult {
        Ok(())
    }

    fn set_sequence_callback(&mut self, _sequence: Arc<Sequence>) {}
}

/// Event processor scheduled as a cooperative task.
///
/// Error policy matches the sync processor: a swallowed event error
/// advances past the batch before the sequence is published, an
/// escalated one halts without advancing.
pub struct AsyncBatchEventProcessor<E, S: Sequencer, H, X> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier<S>>,
    sequence: Arc<Sequence>,
    handler: H,
    exception_handler: X,
    max_batch_size: i64,
    wait_timeout: Option<Duration>,
    shared: Arc<ProcessorShared>,
}

impl<E, S, H> AsyncBatchEventProcessor<E, S, H, FatalExceptionHandler>
where
    E: Send + Sync + 'static,
    S: Sequencer,
    H: AsyncEventHandler<E>,
{
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
            wait_timeout: None,
            shared: Arc::new(ProcessorShared::new()),
        }
    }
}

impl<E, S, H, X> AsyncBatchEventProcessor<E, S, H, X>
where
    E: Send + Sync + 'static,
    S: Sequencer,
    H: AsyncEventHandler<E>,
    X: ExceptionHandler<E>,
{
    pub fn with_exception_handler<X2>(
        self,
        exception_handler: X2,
    ) -> AsyncBatchEventProcessor<E, S, H, X2>
    where
        X2: ExceptionHandler<E>,
    {
        AsyncBatchEventProcessor {
            ring: self.ring,
            barrier: self.barrier,
            sequence: self.sequence,
            handler: self.handler,
            exception_handler,
            max_batch_size: self.max_batch_size,
            wait_timeout: self.wait_timeout,
            shared: self.shared,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Result<Self> {
        if max_batch_size < 1 {
            return Err(TorusError::config("Max batch size must be at least 1"));
        }
        self.max_batch_size = max_batch_size as i64;
        Ok(self)
    }

    /// Surface `on_timeout` when a barrier wait exceeds `timeout`.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

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

    /// Run the consume loop until halted. Fails with `AlreadyRunning`
    /// when the processor is not idle.
    pub async fn run(&mut self) -> Result<()> {
        if !self.shared.try_start() {
            return Err(TorusError::AlreadyRunning);
        }
        self.barrier.clear_alert();

        if let Err(err) = self.handler.on_start().await {
            self.exception_handler.handle_start_error(err);
        }
        self.shared.open_latch();

        self.process_events().await;

        if let Err(err) = self.handler.on_shutdown().await {
            self.exception_handler.handle_shutdown_error(err);
        }
        self.shared.close_latch();
        self.shared.set_idle();
        Ok(())
    }

    async fn wait_for(&self, sequence: i64) -> Result<i64> {
        match self.wait_timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.barrier.wait_for_async(sequence)).await {
                    Ok(result) => result,
                    Err(_) => Err(TorusError::Timeout),
                }
            }
            None => self.barrier.wait_for_async(sequence).await,
        }
    }

    async fn process_events(&mut self) {
        let mut next = self.sequence.get_relaxed() + 1;

        loop {
            match self.wait_for(next).await {
                Ok(available) => {
                    if available < next {
                        // Multi-producer gap below `next`; let peers run
                        // while the publisher fills it in.
                        tokio::task::yield_now().await;
                        continue;
                    }
                    let capped = available.min(next + self.max_batch_size - 1);

                    let mut lo = next;
                    while lo <= capped {
                        let batch = self.ring.slice(lo, capped);
                        let len = batch.len() as i64;

                        if let Err(err) = self.handler.on_batch(batch, lo).await {
                            match self.exception_handler.handle_event_error(err, lo, batch) {
                                Ok(()) => {}
                                Err(_) => {
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
                    if let Err(err) = self.handler.on_timeout(current).await {
                        self.exception_handler.handle_timeout_error(err, current);
                    }
                }
                Err(err) if err.is_alert() => {
                    if !self.shared.is_running() {
                        return;
                    }
                    self.barrier.clear_alert();
                }
                Err(_) => return,
            }
        }
    }
}
