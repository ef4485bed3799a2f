//! Three producers fanning into one consumer.
//!
//! Run: cargo run --release --example mp_fanin

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use torus::wait_strategy::YieldingWaitStrategy;
use torus::{
    BatchEventProcessor, EventHandler, HandlerResult, MultiProducerSequencer, ProducerMode,
    RingBuffer, RingConfig, Sequencer, WaitStrategyKind,
};

const RING_SIZE: usize = 65_536;
const PRODUCERS: usize = 3;
const PER_PRODUCER: i64 = 500_000;

struct Count {
    events: Arc<AtomicI64>,
}

impl EventHandler<i64> for Count {
    fn on_batch(&mut self, batch: &[i64], _start: i64) -> HandlerResult {
        self.events.fetch_add(batch.len() as i64, Ordering::Relaxed);
        Ok(())
    }
}

fn main() -> torus::Result<()> {
    let config = RingConfig::new(RING_SIZE)?
        .with_producer_mode(ProducerMode::Multi)
        .with_wait_strategy(WaitStrategyKind::Yielding)
        .with_max_batch_size(4096)?;

    let ring = Arc::new(RingBuffer::<i64>::new(config.size)?);
    let sequencer = Arc::new(MultiProducerSequencer::new(
        config.size,
        YieldingWaitStrategy::new(),
    )?);

    let events = Arc::new(AtomicI64::new(0));
    let mut processor = BatchEventProcessor::new(
        ring.clone(),
        sequencer.new_barrier(&[]),
        Count {
            events: events.clone(),
        },
    )
    .with_max_batch_size(config.max_batch_size)?;
    sequencer.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();
    let consumer = thread::spawn(move || processor.run());

    let total = PRODUCERS as i64 * PER_PRODUCER;
    let start = Instant::now();

    let mut producers = Vec::new();
    for id in 0..PRODUCERS {
        let ring = ring.clone();
        let sequencer = sequencer.clone();
        producers.push(thread::spawn(move || {
            for _ in 0..PER_PRODUCER {
                let seq = sequencer.next(1);
                unsafe {
                    *ring.get_mut(seq) = id as i64;
                }
                sequencer.publish(seq);
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    while handle.sequence().get() < total - 1 {
        thread::yield_now();
    }
    let elapsed = start.elapsed();

    handle.halt();
    consumer.join().unwrap()?;

    println!("producers:  {}", PRODUCERS);
    println!("events:     {}", events.load(Ordering::Relaxed));
    println!("cursor:     {}", sequencer.cursor().get());
    println!("elapsed:    {:?}", elapsed);
    println!(
        "throughput: {:.1}M events/s",
        total as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
    Ok(())
}
