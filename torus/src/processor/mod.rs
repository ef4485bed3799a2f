//! Consumer run loops.
//!
//! An event processor owns one consumer cursor, repeatedly asks its
//! barrier for work and delivers batches to a user handler. The sync
//! variant occupies a thread; the async variant suspends at the barrier
//! and at handler calls.

mod batch;
#[cfg(feature = "async")]
mod task;

pub use batch::BatchEventProcessor;
#[cfg(feature = "async")]
pub use task::{AsyncBatchEventProcessor, AsyncEventHandler};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::barrier::SequenceBarrier;
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;

/// Lifecycle of an event processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Halted = 2,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Halted,
            _ => Self::Idle,
        }
    }
}

/// Run state plus started latch, shared between a processor and its handles.
pub(crate) struct ProcessorShared {
    state: AtomicU8,
    started: Mutex<bool>,
    started_cond: Condvar,
}

impl ProcessorShared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(RunState::Idle as u8),
            started: Mutex::new(false),
            started_cond: Condvar::new(),
        }
    }

    /// Idle -> Running. False when the processor is already running or halted.
    pub(crate) fn try_start(&self) -> bool {
        self.state
            .compare_exchange(
                RunState::Idle as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Running -> Halted. No-op in any other state, so halting twice or
    /// halting an idle processor is harmless.
    pub(crate) fn halt(&self) {
        let _ = self.state.compare_exchange(
            RunState::Running as u8,
            RunState::Halted as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn set_idle(&self) {
        self.state.store(RunState::Idle as u8, Ordering::Release);
    }

    pub(crate) fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub(crate) fn open_latch(&self) {
        let mut started = self.started.lock();
        *started = true;
        self.started_cond.notify_all();
    }

    pub(crate) fn close_latch(&self) {
        *self.started.lock() = false;
    }

    pub(crate) fn wait_started(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut started = self.started.lock();
        while !*started {
            if self
                .started_cond
                .wait_until(&mut started, deadline)
                .timed_out()
            {
                return *started;
            }
        }
        true
    }
}

/// Cloneable remote control for a processor whose `run()` loop owns it
/// on another thread or task.
pub struct ProcessorHandle<S: Sequencer> {
    sequence: Arc<Sequence>,
    barrier: Arc<SequenceBarrier<S>>,
    shared: Arc<ProcessorShared>,
}

impl<S: Sequencer> ProcessorHandle<S> {
    pub(crate) fn new(
        sequence: Arc<Sequence>,
        barrier: Arc<SequenceBarrier<S>>,
        shared: Arc<ProcessorShared>,
    ) -> Self {
        Self {
            sequence,
            barrier,
            shared,
        }
    }

    /// The processor's consumer cursor, for gating and downstream barriers.
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

    /// Ask the run loop to stop. Non-blocking and idempotent: a parked
    /// processor is woken through the barrier; one mid-batch stops after
    /// the handler returns.
    pub fn halt(&self) {
        self.shared.halt();
        self.barrier.alert();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    /// Block until the run loop has called `on_start`, or the timeout
    /// expires. Returns whether the processor started.
    pub fn wait_until_started(&self, timeout: Duration) -> bool {
        self.shared.wait_started(timeout)
    }
}

impl<S: Sequencer> Clone for ProcessorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sequence: self.sequence.clone(),
            barrier: self.barrier.clone(),
            shared: self.shared.clone(),
        }
    }
}
