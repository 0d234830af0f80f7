use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use splitqueue::SplitQueue;

const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;
const ITEMS_PER_PRODUCER: usize = 2500;
const TOTAL_ITEMS: usize = PRODUCERS * ITEMS_PER_PRODUCER;

#[derive(Default)]
struct Stats {
    pushed: AtomicUsize,
    pop_attempts: AtomicUsize,
    successful_pops: AtomicUsize,
    empty_pops: AtomicUsize,
    popped_values: Mutex<HashSet<usize>>,
}

fn producer(queue: Arc<SplitQueue<usize>>, stats: Arc<Stats>, id: usize) {
    let start = id * ITEMS_PER_PRODUCER;
    for i in 0..ITEMS_PER_PRODUCER {
        queue.push(start + i);
        stats.pushed.fetch_add(1, Ordering::Relaxed);
        if i % 1000 == 0 {
            thread::sleep(Duration::from_micros(1));
        }
    }
    println!("Producer {} finished pushing {} items", id, ITEMS_PER_PRODUCER);
}

fn consumer(queue: Arc<SplitQueue<usize>>, stats: Arc<Stats>, id: usize) {
    let mut local_pops = 0;
    while stats.successful_pops.load(Ordering::SeqCst) < TOTAL_ITEMS {
        stats.pop_attempts.fetch_add(1, Ordering::Relaxed);
        match queue.pop() {
            Some(value) => {
                let fresh = stats.popped_values.lock().unwrap().insert(value);
                if !fresh {
                    println!("Consumer {} popped duplicate value {}", id, value);
                }
                stats.successful_pops.fetch_add(1, Ordering::SeqCst);
                local_pops += 1;
            }
            None => {
                stats.empty_pops.fetch_add(1, Ordering::Relaxed);
                thread::yield_now();
            }
        }
    }
    println!("Consumer {} finished after popping {} items", id, local_pops);
}

fn main() {
    let queue = Arc::new(SplitQueue::new());
    let stats = Arc::new(Stats::default());
    println!(
        "Starting {} producers and {} consumers, {} items each",
        PRODUCERS, CONSUMERS, ITEMS_PER_PRODUCER
    );
    let started = Instant::now();

    let mut handles = Vec::new();
    for id in 0..PRODUCERS {
        let (queue, stats) = (queue.clone(), stats.clone());
        handles.push(thread::spawn(move || producer(queue, stats, id)));
    }
    for id in 0..CONSUMERS {
        let (queue, stats) = (queue.clone(), stats.clone());
        handles.push(thread::spawn(move || consumer(queue, stats, id)));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let elapsed = started.elapsed();

    let pushed = stats.pushed.load(Ordering::SeqCst);
    let successful_pops = stats.successful_pops.load(Ordering::SeqCst);
    let unique = stats.popped_values.lock().unwrap().len();
    println!("Pushed:          {}", pushed);
    println!("Pop attempts:    {}", stats.pop_attempts.load(Ordering::SeqCst));
    println!("Successful pops: {}", successful_pops);
    println!("Empty pops:      {}", stats.empty_pops.load(Ordering::SeqCst));
    println!("Unique values:   {}", unique);
    println!("Elapsed:         {} ms", elapsed.as_millis());
    println!(
        "Throughput:      {:.0} items/s",
        successful_pops as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    let leftover = queue.pop();
    if successful_pops != TOTAL_ITEMS || unique != TOTAL_ITEMS || leftover.is_some() {
        println!(
            "FAILED: expected {} unique values, got {} pops of {} unique values",
            TOTAL_ITEMS, successful_pops, unique
        );
        std::process::exit(1);
    }
    println!("All {} values were popped exactly once", TOTAL_ITEMS);
}
