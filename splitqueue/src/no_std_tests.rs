use crate::SplitQueue;

#[test]
#[should_panic(expected = "panic: B")]
fn simple_panic() {
    struct PanicOnDrop(char);
    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            if self.0 == 'B' {
                panic!("panic: {}", self.0)
            }
        }
    }
    // Use a box so that T has a heap-allocation, so miri will tell us
    // if it's dropped correctly (it should be)
    let queue = SplitQueue::new();
    queue.push(alloc::boxed::Box::new(PanicOnDrop('A')));
    queue.push(alloc::boxed::Box::new(PanicOnDrop('B')));
    queue.push(alloc::boxed::Box::new(PanicOnDrop('C')));
    drop(queue.pop()); //Drops 'A', no panic
    drop(queue); //This will panic, but shouldn't leak memory
}

#[test]
fn smoke_test() {
    let queue = SplitQueue::new();
    queue.push(45u64);
    queue.push(46);
    assert_eq!(queue.pop(), Some(45));
    assert!(!queue.is_empty());
    assert_eq!(queue.pop(), Some(46));
    assert_eq!(queue.pop(), None);
}
