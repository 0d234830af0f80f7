//! Common interface over the queues compared in the benchmarks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::queue::SegQueue;
use splitqueue::SplitQueue;

/// A queue that can be shared between producer and consumer threads.
pub trait BenchQueue<T>: Send + Sync {
    fn push(&self, value: T);
    fn pop(&self) -> Option<T>;
}

impl<T: Send> BenchQueue<T> for SplitQueue<T> {
    fn push(&self, value: T) {
        SplitQueue::push(self, value)
    }
    fn pop(&self) -> Option<T> {
        SplitQueue::pop(self)
    }
}

impl<T: Send> BenchQueue<T> for SegQueue<T> {
    fn push(&self, value: T) {
        SegQueue::push(self, value)
    }
    fn pop(&self) -> Option<T> {
        SegQueue::pop(self)
    }
}

/// The baseline: a plain deque behind a mutex.
#[derive(Default)]
pub struct LockedQueue<T>(Mutex<VecDeque<T>>);

impl<T: Send> BenchQueue<T> for LockedQueue<T> {
    fn push(&self, value: T) {
        self.0.lock().unwrap().push_back(value)
    }
    fn pop(&self) -> Option<T> {
        self.0.lock().unwrap().pop_front()
    }
}

/// Push `per_producer` values from each of `producers` threads, while `consumers`
/// threads poll until all of them have been popped. Returns the sum of popped values.
pub fn run_mpmc<Q: BenchQueue<u64> + 'static>(
    queue: Arc<Q>,
    producers: u64,
    consumers: u64,
    per_producer: u64,
) -> u64 {
    let total = producers * per_producer;
    let remaining = Arc::new(std::sync::atomic::AtomicU64::new(total));
    let mut handles = Vec::new();
    for p in 0..producers {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                queue.push(p * per_producer + i);
            }
            0
        }));
    }
    for _ in 0..consumers {
        let queue = queue.clone();
        let remaining = remaining.clone();
        handles.push(thread::spawn(move || {
            let mut sum = 0;
            while remaining.load(std::sync::atomic::Ordering::Relaxed) > 0 {
                if let Some(value) = queue.pop() {
                    sum += value;
                    remaining.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                } else {
                    thread::yield_now();
                }
            }
            sum
        }));
    }
    handles.into_iter().map(|h| h.join().unwrap()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_queues_deliver_everything() {
        let expected: u64 = (0..4 * 500).sum();
        assert_eq!(run_mpmc(Arc::new(SplitQueue::new()), 4, 2, 500), expected);
        assert_eq!(run_mpmc(Arc::new(SegQueue::new()), 4, 2, 500), expected);
        assert_eq!(run_mpmc(Arc::new(LockedQueue::default()), 4, 2, 500), expected);
    }
}
