//! Async processor tests: same delivery contract, cooperative scheduling.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use torus::wait_strategy::BusySpinWaitStrategy;
use torus::{
    AsyncBatchEventProcessor, AsyncEventHandler, HandlerResult, IgnoreExceptionHandler,
    RingBuffer, RunState, Sequencer, SingleProducerSequencer,
};

struct AsyncSum {
    sum: Arc<AtomicI64>,
    events: Arc<AtomicI64>,
}

impl AsyncEventHandler<i64> for AsyncSum {
    async fn on_batch(&mut self, batch: &[i64], _start: i64) -> HandlerResult {
        for value in batch {
            self.sum.fetch_add(*value, Ordering::AcqRel);
        }
        self.events.fetch_add(batch.len() as i64, Ordering::AcqRel);
        Ok(())
    }
}

struct AsyncFailAt {
    fail_at: i64,
    delivered: Arc<AtomicI64>,
}

impl AsyncEventHandler<i64> for AsyncFailAt {
    async fn on_batch(&mut self, batch: &[i64], start: i64) -> HandlerResult {
        for i in 0..batch.len() as i64 {
            if start + i == self.fail_at {
                return Err(format!("poisoned event at sequence {}", self.fail_at).into());
            }
            self.delivered.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

struct AsyncTimeoutProbe {
    timeouts: Arc<AtomicI64>,
    batches: Arc<AtomicI64>,
}

impl AsyncEventHandler<i64> for AsyncTimeoutProbe {
    async fn on_batch(&mut self, _batch: &[i64], _start: i64) -> HandlerResult {
        self.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn on_timeout(&mut self, _sequence: i64) -> HandlerResult {
        self.timeouts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

fn topology(
    size: usize,
) -> (
    Arc<RingBuffer<i64>>,
    Arc<SingleProducerSequencer<BusySpinWaitStrategy>>,
) {
    let ring = Arc::new(RingBuffer::<i64>::new(size).unwrap());
    let sequencer = Arc::new(SingleProducerSequencer::new(size, BusySpinWaitStrategy::new()).unwrap());
    (ring, sequencer)
}

async fn settle(sequence: &torus::Sequence, target: i64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while sequence.get() < target {
        assert!(tokio::time::Instant::now() < deadline, "consumer stalled");
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_processor_delivers_in_order() {
    let (ring, sequencer) = topology(16);
    let sum = Arc::new(AtomicI64::new(0));
    let events = Arc::new(AtomicI64::new(0));

    let mut processor = AsyncBatchEventProcessor::new(
        ring.clone(),
        sequencer.new_barrier(&[]),
        AsyncSum {
            sum: sum.clone(),
            events: events.clone(),
        },
    );
    sequencer.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();

    let task = tokio::spawn(async move { processor.run().await });

    for value in 1..=20 {
        let seq = sequencer.next(1);
        unsafe {
            *ring.get_mut(seq) = value;
        }
        sequencer.publish(seq);
        tokio::task::yield_now().await;
    }

    settle(&handle.sequence(), 19).await;
    assert_eq!(sum.load(Ordering::Acquire), 210);
    assert_eq!(events.load(Ordering::Acquire), 20);

    handle.halt();
    task.await.unwrap().unwrap();
    assert_eq!(handle.state(), RunState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_fatal_error_halts_without_advancing() {
    let (ring, sequencer) = topology(32);
    let delivered = Arc::new(AtomicI64::new(0));

    let mut processor = AsyncBatchEventProcessor::new(
        ring.clone(),
        sequencer.new_barrier(&[]),
        AsyncFailAt {
            fail_at: 5,
            delivered: delivered.clone(),
        },
    )
    .with_max_batch_size(1)
    .unwrap();
    sequencer.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();

    for value in 0..10 {
        let seq = sequencer.next(1);
        unsafe {
            *ring.get_mut(seq) = value;
        }
        sequencer.publish(seq);
    }

    let task = tokio::spawn(async move { processor.run().await });
    task.await.unwrap().unwrap();

    // Batches are capped at one event, so the failed sequence is exactly
    // where the cursor stops.
    assert_eq!(handle.sequence().get(), 4);
    assert_eq!(delivered.load(Ordering::Acquire), 5);
    assert!(!handle.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_swallowed_error_advances_past_batch() {
    let (ring, sequencer) = topology(32);
    let delivered = Arc::new(AtomicI64::new(0));

    let mut processor = AsyncBatchEventProcessor::new(
        ring.clone(),
        sequencer.new_barrier(&[]),
        AsyncFailAt {
            fail_at: 5,
            delivered: delivered.clone(),
        },
    )
    .with_exception_handler(IgnoreExceptionHandler)
    .with_max_batch_size(1)
    .unwrap();
    sequencer.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();

    for value in 0..10 {
        let seq = sequencer.next(1);
        unsafe {
            *ring.get_mut(seq) = value;
        }
        sequencer.publish(seq);
    }

    let task = tokio::spawn(async move { processor.run().await });
    settle(&handle.sequence(), 9).await;

    handle.halt();
    task.await.unwrap().unwrap();
    assert_eq!(handle.sequence().get(), 9);
    assert_eq!(delivered.load(Ordering::Acquire), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_wait_timeout_surfaces_on_timeout() {
    let (ring, sequencer) = topology(8);
    let timeouts = Arc::new(AtomicI64::new(0));
    let batches = Arc::new(AtomicI64::new(0));

    let mut processor = AsyncBatchEventProcessor::new(
        ring,
        sequencer.new_barrier(&[]),
        AsyncTimeoutProbe {
            timeouts: timeouts.clone(),
            batches: batches.clone(),
        },
    )
    .with_wait_timeout(Duration::from_millis(20));
    sequencer.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();

    let task = tokio::spawn(async move { processor.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while timeouts.load(Ordering::Acquire) < 1 {
        assert!(tokio::time::Instant::now() < deadline, "no timeout surfaced");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(batches.load(Ordering::Acquire), 0);

    handle.halt();
    task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_run_is_exclusive() {
    let (ring, sequencer) = topology(8);
    let mut processor = AsyncBatchEventProcessor::new(
        ring,
        sequencer.new_barrier(&[]),
        AsyncSum {
            sum: Arc::new(AtomicI64::new(0)),
            events: Arc::new(AtomicI64::new(0)),
        },
    );
    sequencer.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();

    let task = tokio::spawn(async move {
        processor.run().await.unwrap();
        processor
    });

    // Wait for the task to take the running state, then stop it.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !handle.is_running() {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::task::yield_now().await;
    }
    handle.halt();
    let mut processor = task.await.unwrap();

    // Idle again: a fresh run must be accepted.
    assert_eq!(processor.state(), RunState::Idle);
    let task = tokio::spawn(async move { processor.run().await });
    while !handle.is_running() {
        tokio::task::yield_now().await;
    }
    handle.halt();
    task.await.unwrap().unwrap();
}
