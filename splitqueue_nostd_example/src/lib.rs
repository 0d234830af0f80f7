#![no_std]
extern crate alloc;

use splitqueue::SplitQueue;

pub fn create_queue(values: &[u32]) -> SplitQueue<u32> {
    let queue = SplitQueue::new();
    for value in values {
        queue.push(*value);
    }
    queue
}
