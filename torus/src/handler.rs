//! Event handler and exception handler contracts.
//!
//! Handlers are the only user code on the consumer hot path. They report
//! failures by returning an error; what happens next is the exception
//! handler's decision (swallow and keep the pipeline moving, or escalate
//! and halt the processor).

use std::sync::Arc;

use crate::error::HandlerError;
use crate::sequence::Sequence;

/// Outcome of a single handler invocation.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Consumer-side callback invoked by an event processor.
pub trait EventHandler<E>: Send {
    /// Deliver a contiguous batch of published events.
    ///
    /// `batch[i]` corresponds to sequence `start_sequence + i`.
    fn on_batch(&mut self, batch: &[E], start_sequence: i64) -> HandlerResult;

    /// Called once when the processor thread starts, before any events.
    fn on_start(&mut self) -> HandlerResult {
        Ok(())
    }

    /// Called once when the processor is shutting down, after the last batch.
    fn on_shutdown(&mut self) -> HandlerResult {
        Ok(())
    }

    /// Called when a timeout wait strategy expires with nothing to
    /// consume. `sequence` is the handler's current position.
    fn on_timeout(&mut self, _sequence: i64) -> HandlerResult {
        Ok(())
    }

    /// Receives the processor's own sequence before startup, for
    /// handlers that watermark their progress.
    fn set_sequence_callback(&mut self, _sequence: Arc<Sequence>) {}
}

/// Policy for errors escaping a handler.
pub trait ExceptionHandler<E>: Send {
    /// An `on_batch` error. Returning `Ok` swallows it and the processor
    /// advances past the batch; returning `Err` halts the processor
    /// without advancing.
    fn handle_event_error(
        &mut self,
        error: HandlerError,
        sequence: i64,
        batch: &[E],
    ) -> HandlerResult;

    /// An `on_start` error. Never escalates.
    fn handle_start_error(&mut self, _error: HandlerError) {}

    /// An `on_shutdown` error. Never escalates.
    fn handle_shutdown_error(&mut self, _error: HandlerError) {}

    /// An `on_timeout` error. Never escalates.
    fn handle_timeout_error(&mut self, _error: HandlerError, _sequence: i64) {}
}

/// Default policy: any event error aborts the processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct FatalExceptionHandler;

impl<E> ExceptionHandler<E> for FatalExceptionHandler {
    fn handle_event_error(
        &mut self,
        error: HandlerError,
        _sequence: i64,
        _batch: &[E],
    ) -> HandlerResult {
        Err(error)
    }
}

/// Swallow-everything policy: the pipeline keeps moving past failed batches.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreExceptionHandler;

impl<E> ExceptionHandler<E> for IgnoreExceptionHandler {
    fn handle_event_error(
        &mut self,
        _error: HandlerError,
        _sequence: i64,
        _batch: &[E],
    ) -> HandlerResult {
        Ok(())
    }
}
