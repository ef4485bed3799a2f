//! Single producer, single consumer: sum 1..=1,000,000.
//!
//! Run: cargo run --release --example spsc_sum

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use torus::wait_strategy::BusySpinWaitStrategy;
use torus::{
    BatchEventProcessor, EventHandler, HandlerResult, RingBuffer, Sequencer,
    SingleProducerSequencer,
};

const RING_SIZE: usize = 65_536;
const COUNT: i64 = 1_000_000;

struct Sum {
    total: Arc<AtomicI64>,
}

impl EventHandler<i64> for Sum {
    fn on_batch(&mut self, batch: &[i64], _start: i64) -> HandlerResult {
        let mut sum = 0;
        for value in batch {
            sum += *value;
        }
        self.total.fetch_add(sum, Ordering::Relaxed);
        Ok(())
    }
}

fn main() -> torus::Result<()> {
    let ring = Arc::new(RingBuffer::<i64>::new(RING_SIZE)?);
    let sequencer = Arc::new(SingleProducerSequencer::new(
        RING_SIZE,
        BusySpinWaitStrategy::new(),
    )?);

    let total = Arc::new(AtomicI64::new(0));
    let mut processor = BatchEventProcessor::new(
        ring.clone(),
        sequencer.new_barrier(&[]),
        Sum {
            total: total.clone(),
        },
    );
    sequencer.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();
    let consumer = thread::spawn(move || processor.run());

    let start = Instant::now();
    for value in 1..=COUNT {
        let seq = sequencer.next(1);
        unsafe {
            *ring.get_mut(seq) = value;
        }
        sequencer.publish(seq);
    }

    while handle.sequence().get() < COUNT - 1 {
        std::hint::spin_loop();
    }
    let elapsed = start.elapsed();

    handle.halt();
    consumer.join().unwrap()?;

    println!("events:     {}", COUNT);
    println!("sum:        {}", total.load(Ordering::Relaxed));
    println!("elapsed:    {:?}", elapsed);
    println!(
        "throughput: {:.1}M events/s",
        COUNT as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
    Ok(())
}
