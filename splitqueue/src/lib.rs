#![no_std]
#![forbid(clippy::undocumented_unsafe_blocks)]
#![deny(missing_docs)]

//! # Introduction to SplitQueue
//!
//! [`SplitQueue`] is an unbounded multi-producer/multi-consumer FIFO queue. Any number of
//! threads may call [`SplitQueue::push`] and [`SplitQueue::pop`] concurrently through a
//! shared reference. No locks are taken, and nodes removed from the queue are reclaimed
//! without a garbage collector, hazard pointers or epochs.
//!
//! ## Example
//! ```rust
//! # #[cfg(not(any(loom,feature="shuttle")))]
//! # {
//! # extern crate splitqueue;
//! # use splitqueue::SplitQueue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(SplitQueue::new());
//! let producer_queue = Arc::clone(&queue);
//!
//! let producer = thread::spawn(move||{
//!     for i in 0..100u32 {
//!         producer_queue.push(i);
//!     }
//! });
//! producer.join().unwrap();
//!
//! // A single producer's values come out in the order they were pushed.
//! for i in 0..100u32 {
//!     assert_eq!(queue.pop(), Some(i));
//! }
//! assert_eq!(queue.pop(), None);
//! # }
//! ```
//!
//! # Strong points
//! * All operations are lock free (see <https://en.wikipedia.org/wiki/Non-blocking_algorithm> )
//! * `pop` on an empty queue returns `None` right away. Callers that want to wait must
//!   poll (spin or yield) themselves.
//! * Every `push` and `pop` is linearizable. If `push(a)` completes before `push(b)` starts,
//!   `a` is popped before `b`.
//! * Works in `no_std` environments (with `alloc`).
//!
//! # Limitations
//!
//! * There is no capacity limit and no backpressure. A queue that is pushed to faster than
//!   it is drained grows without bound.
//! * Every value is boxed, and every queued value costs one 64-byte node.
//! * At most 4194302 threads may operate on the same end of the queue at once.
//!   See 'Pitfall #1' below.
//!
//! # Implementation
//!
//! The queue is a singly linked list of nodes. `head` points at the node holding the oldest
//! value, `tail` points at an empty sentinel node at the end of the list. A push moves its
//! value into the sentinel's data slot (a compare-and-swap from empty), links a fresh empty
//! node behind it and makes the fresh node the new `tail`. A pop moves `head` one node
//! forward and takes the value out of the node it just stepped off, leaving a *consumed*
//! marker in the slot. A slot never returns to empty, so only the current tail node can
//! ever accept a value.
//!
//! The hard part is knowing when a node that `head` has moved past can be freed, since
//! other threads may have loaded its address a moment earlier and be about to read it.
//! SplitQueue solves this with split reference counting:
//!
//! * `head`, `tail` and every `next` link are *counted pointers*: a node address and an
//!   *external count* packed into a single 64-bit atomic word. A thread that wants to
//!   dereference the node first increments the external count with a compare-and-swap
//!   on the very word it loaded the address from. Because address and count change
//!   together, the thread can never increment the count of a node that has already left
//!   that slot.
//! * Each node has an *internal count*, packed together with the number of counted
//!   pointers still naming it. A thread that is done with a node decrements the internal
//!   count. When a counted pointer is removed from `head` or `tail` for good, its external
//!   count (minus the remover's own increment and the creation baseline) is transferred to
//!   the internal count in one atomic step.
//! * A node is freed by whichever thread brings both halves of its counter to zero. This
//!   happens exactly once.
//!
//! # Pitfall #1 - external count limits
//!
//! Nodes are 64-byte aligned, which lets a counted pointer store the node address in
//! 42 bits and the external count in the remaining 22. An acquisition that is given up
//! through the node's internal count stays in the external count until the word is retired.
//! That only happens once the slot has moved to another node:
//!
//! * A push that loses the race for the tail node waits, still holding its reference,
//!   until `tail` has moved on. So each pusher adds at most one to a given `tail` value.
//! * A pop or `is_empty` that is done with `head` while `head` still names the same node
//!   hands its increment straight back to `head`, retrying until it succeeds or `head`
//!   moves. A pop whose compare-and-swap on `head` fails because another thread changed
//!   only the count keeps its reference and retries with the new count.
//!
//! Every external count is thus at most one plus the number of threads operating on that
//! end of the queue. Reaching the limit anyway is detected and causes a panic.
//!
//! Node addresses must fit in 48 bits. This holds for user-space allocations on all
//! common 64-bit platforms. An allocation outside that range also causes a panic.

extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

use alloc::boxed::Box;
use core::fmt::{Debug, Formatter};
use core::marker::PhantomData;
use core::ptr::null_mut;

// All atomic primitives are reexported from a
// local module called 'atomic', so we can easily change between using
// types from 'core' (normal case) and types from shuttle/loom testing libraries.

/// Declarations of atomic ops for using SplitQueue in production
#[cfg(all(not(loom), not(feature = "shuttle")))]
mod atomic {
    pub use core::hint::spin_loop;
    pub use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
    #[allow(unused)]
    #[cfg(any(feature = "std", test))]
    pub use std::thread;
}

/// Declarations for verifying SplitQueue using 'shuttle'
#[cfg(feature = "shuttle")]
mod atomic {
    pub use shuttle::hint::spin_loop;
    pub use shuttle::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
    #[allow(unused)]
    pub use shuttle::thread;
}

/// Declarations for verifying SplitQueue using 'loom'
#[cfg(loom)]
mod atomic {
    pub use loom::hint::spin_loop;
    pub use loom::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
    #[allow(unused)]
    pub use loom::thread;
}

/// Define a macro for debug-output, only used in debug-builds.
#[cfg(all(feature = "debug", not(loom)))]
macro_rules! debug_println {
    ($($x:tt)*) => {
        std::println!("{:?}: {}", crate::atomic::thread::current().id(), std::format!($($x)*))
    }
}
#[cfg(all(feature = "debug", loom))]
macro_rules! debug_println {
    ($($x:tt)*) => { std::println!($($x)*) }
}

#[cfg(not(feature = "debug"))]
macro_rules! debug_println {
    ($($x:tt)*) => {{}};
}

mod deferred_panics_helper;

use crate::atomic::Ordering;
use crate::deferred_panics_helper::{DropHandler, IDropHandler};

/// Nodes are aligned to `1 << NODE_ALIGN_BITS` bytes. The low bits of a node
/// address are thus always zero, and are not stored in counted pointers.
const NODE_ALIGN_BITS: u32 = 6;
/// Number of significant bits in a node address.
const ADDRESS_BITS: u32 = 48;
/// Bits of a packed counted pointer used for the (shifted) node address.
const ADDRESS_FIELD_BITS: u32 = ADDRESS_BITS - NODE_ALIGN_BITS;
const ADDRESS_FIELD_MASK: u64 = (1 << ADDRESS_FIELD_BITS) - 1;
/// The largest external count a counted pointer can carry.
const MAX_EXTERNAL_COUNT: u64 = (1 << (64 - ADDRESS_FIELD_BITS)) - 1;

/// Every node starts out owed to two counted pointers: the one published in `tail`,
/// and the one that will be copied from its predecessor's `next` into `head`.
const INITIAL_EXTERNAL_COUNTERS: u32 = 2;

#[cfg(feature = "validate")]
const MAGIC1: u64 = 0xbeef_beef_beef_8111;
#[cfg(feature = "validate")]
const MAGIC2: u64 = 0x1234_1234_1234_8111;

/// An unbounded, lock free, multi-producer/multi-consumer FIFO queue.
/// See `crate` documentation for more information.
///
/// ```rust
/// # #[cfg(not(any(loom,feature="shuttle")))]
/// # {
/// # extern crate splitqueue;
/// # use splitqueue::SplitQueue;
/// let queue = SplitQueue::new();
/// queue.push("first");
/// queue.push("second");
/// assert_eq!(queue.pop(), Some("first"));
/// assert_eq!(queue.pop(), Some("second"));
/// assert_eq!(queue.pop(), None);
/// # }
/// ```
pub struct SplitQueue<T> {
    head: AtomicCountedPtr<T>,
    tail: AtomicCountedPtr<T>,
    node_tally: NodeTally,
}

/// Live node counter, only tracked in tests.
#[cfg(test)]
type NodeTally = std::sync::Arc<std::sync::atomic::AtomicUsize>;
#[cfg(not(test))]
type NodeTally = ();

/// SAFETY:
/// Values are moved into the queue by one thread and out of it by another, so
/// T must be Send. No &T is ever handed out, so T need not be Sync.
unsafe impl<T: Send> Send for SplitQueue<T> {}

/// SAFETY:
/// All shared state is accessed through atomics, following the split reference
/// counting protocol. Sharing the queue only ever moves T between threads.
unsafe impl<T: Send> Sync for SplitQueue<T> {}

/// A node in the queue's linked list.
#[repr(C, align(64))]
struct Node<T> {
    #[cfg(feature = "validate")]
    magic1: core::sync::atomic::AtomicU64,
    /// Owning pointer to a boxed payload, or null
    data: atomic::AtomicPtr<T>,
    /// A packed [`NodeCount`]
    count: atomic::AtomicU64,
    next: AtomicCountedPtr<T>,
    #[cfg(feature = "validate")]
    magic2: core::sync::atomic::AtomicU64,
    #[cfg(test)]
    _tally: tests::leak_detection::InstanceSpy,
}

const _: () = assert!(core::mem::align_of::<Node<()>>() == 1 << NODE_ALIGN_BITS);

/// A node address together with the number of references acquired through the
/// atomic slot this value was loaded from.
struct CountedPtr<T> {
    external_count: u64,
    node: *mut Node<T>,
}

impl<T> Clone for CountedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for CountedPtr<T> {}

impl<T> PartialEq for CountedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.external_count == other.external_count && self.node == other.node
    }
}

impl<T> Debug for CountedPtr<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:?}, ext {})", self.node, self.external_count)
    }
}

impl<T> CountedPtr<T> {
    const fn null() -> CountedPtr<T> {
        CountedPtr {
            external_count: 0,
            node: null_mut(),
        }
    }
    fn pack(self) -> u64 {
        debug_assert!(self.external_count <= MAX_EXTERNAL_COUNT);
        let address = (self.node as usize as u64) >> NODE_ALIGN_BITS;
        (self.external_count << ADDRESS_FIELD_BITS) | address
    }
    fn unpack(raw: u64) -> CountedPtr<T> {
        CountedPtr {
            external_count: raw >> ADDRESS_FIELD_BITS,
            node: ((raw & ADDRESS_FIELD_MASK) << NODE_ALIGN_BITS) as usize as *mut Node<T>,
        }
    }
}

/// A [`CountedPtr`] stored in a single atomic word, so that the address and the
/// count are always read and written together.
struct AtomicCountedPtr<T> {
    raw: atomic::AtomicU64,
    phantom: PhantomData<*mut Node<T>>,
}

impl<T> AtomicCountedPtr<T> {
    fn new(ptr: CountedPtr<T>) -> AtomicCountedPtr<T> {
        AtomicCountedPtr {
            raw: atomic::AtomicU64::new(ptr.pack()),
            phantom: PhantomData,
        }
    }
    fn load(&self, order: Ordering) -> CountedPtr<T> {
        CountedPtr::unpack(self.raw.load(order))
    }
    fn store(&self, ptr: CountedPtr<T>, order: Ordering) {
        self.raw.store(ptr.pack(), order)
    }
    fn swap(&self, ptr: CountedPtr<T>, order: Ordering) -> CountedPtr<T> {
        CountedPtr::unpack(self.raw.swap(ptr.pack(), order))
    }
    fn compare_exchange(
        &self,
        current: CountedPtr<T>,
        new: CountedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedPtr<T>, CountedPtr<T>> {
        self.raw
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(CountedPtr::unpack)
            .map_err(CountedPtr::unpack)
    }
}

/// The two halves of a node's reference count, always updated as one unit.
///
/// `internal_count` may transiently be negative: a thread can release its reference
/// before the count it acquired through `head`/`tail` has been transferred to the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeCount {
    internal_count: i32,
    external_counters: u32,
}

impl NodeCount {
    fn pack(self) -> u64 {
        ((self.external_counters as u64) << 32) | (self.internal_count as u32 as u64)
    }
    fn unpack(raw: u64) -> NodeCount {
        NodeCount {
            internal_count: raw as u32 as i32,
            external_counters: (raw >> 32) as u32,
        }
    }
    fn is_zero(self) -> bool {
        self.internal_count == 0 && self.external_counters == 0
    }
}

impl<T> Node<T> {
    /// Allocate a fresh, empty node, owed to two counted pointers.
    fn allocate(_tally: &NodeTally) -> *mut Node<T> {
        let node = Box::into_raw(Box::new(Node {
            #[cfg(feature = "validate")]
            magic1: core::sync::atomic::AtomicU64::new(MAGIC1),
            data: atomic::AtomicPtr::new(null_mut()),
            count: atomic::AtomicU64::new(
                NodeCount {
                    internal_count: 0,
                    external_counters: INITIAL_EXTERNAL_COUNTERS,
                }
                .pack(),
            ),
            next: AtomicCountedPtr::new(CountedPtr::null()),
            #[cfg(feature = "validate")]
            magic2: core::sync::atomic::AtomicU64::new(MAGIC2),
            #[cfg(test)]
            _tally: tests::leak_detection::InstanceSpy::new(_tally.clone()),
        }));
        if (node as usize as u64) >> ADDRESS_BITS != 0 {
            panic!(
                "Internal error in splitqueue: node address {:?} does not fit in {} bits",
                node, ADDRESS_BITS
            );
        }
        debug_println!("Allocated node {:?}", node);
        node
    }
}

#[cfg(feature = "validate")]
#[cfg_attr(test, mutants::skip)] // This is only used for validation and test, it has no behaviour
impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        let this = self as *const Node<T>;
        verify_node(this);
        let data = self.data.load(Ordering::SeqCst);
        if !data.is_null() && data != consumed_marker(this) {
            panic!("Internal error in splitqueue: freeing node {:?} which still holds a value", this);
        }
        self.magic1 = core::sync::atomic::AtomicU64::new(0xDEADDEA1DEADDEA1);
        self.magic2 = core::sync::atomic::AtomicU64::new(0xDEADDEA2DEADDEA2);
    }
}

/// Check the magic values of the supplied node, validating it in a best-effort fashion
#[inline]
#[cfg_attr(test, mutants::skip)]
fn verify_node<T>(_node: *const Node<T>) {
    #[cfg(feature = "validate")]
    {
        // SAFETY:
        // Callers only pass nodes they hold a reference to. If they don't, this is
        // exactly the bug we're trying to catch, on a best effort basis.
        let node = unsafe { &*_node };
        let magic1 = node.magic1.load(core::sync::atomic::Ordering::SeqCst);
        let magic2 = node.magic2.load(core::sync::atomic::Ordering::SeqCst);
        if magic1 != MAGIC1 || magic2 != MAGIC2 {
            panic!(
                "Internal error in splitqueue: bad magic in {:?}: {:x} {:x}",
                _node, magic1, magic2
            );
        }
    }
}

/// The value a popped node's data slot is left holding.
///
/// A slot goes empty -> payload -> consumed, and never back to empty, so a push
/// whose compare-and-swap from empty succeeds has always found the current tail.
/// The node's own address can never be the address of a boxed payload.
#[inline]
fn consumed_marker<T>(node: *const Node<T>) -> *mut T {
    node as *mut T
}

/// Deallocate the node.
///
/// SAFETY:
/// Both halves of the node's count must have reached zero (or the queue must be
/// quiescent and the node unreachable), and the data slot must be empty.
unsafe fn free_node<T>(node: *mut Node<T>) {
    verify_node(node);
    debug_println!("Freeing node {:?}", node);
    // SAFETY:
    // The node was created by Box::into_raw, and the caller guarantees nobody else can
    // reach it any more.
    drop(unsafe { Box::from_raw(node) });
}

/// Acquire a reference to the node named by `slot`.
///
/// `observed` is the caller's most recent view of `slot`. It is refreshed until the
/// increment succeeds, after which it holds exactly the value now stored in `slot`,
/// and the caller owns one external reference to `observed.node`.
fn increase_external_count<T>(slot: &AtomicCountedPtr<T>, observed: &mut CountedPtr<T>) {
    loop {
        if observed.external_count >= MAX_EXTERNAL_COUNT {
            panic!(
                "Internal error in splitqueue: external count overflow on {:?}",
                observed
            );
        }
        let incremented = CountedPtr {
            external_count: observed.external_count + 1,
            node: observed.node,
        };
        match slot.compare_exchange(*observed, incremented, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => {
                debug_println!("Acquired {:?}", incremented);
                *observed = incremented;
                return;
            }
            Err(actual) => {
                *observed = actual;
            }
        }
    }
}

/// Give up a reference acquired through [`increase_external_count`], by decrementing
/// the node's internal count. Frees the node if this was the last reference.
///
/// SAFETY:
/// The caller must own a reference to `node`, and must not touch the node afterwards.
unsafe fn release_ref<T>(node: *mut Node<T>) {
    verify_node(node);
    // SAFETY:
    // The caller's reference keeps the node alive until the decrement below.
    let count = unsafe { &(*node).count };
    let mut current = NodeCount::unpack(count.load(Ordering::Relaxed));
    loop {
        let updated = NodeCount {
            internal_count: current.internal_count - 1,
            external_counters: current.external_counters,
        };
        match count.compare_exchange(
            current.pack(),
            updated.pack(),
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                debug_println!("release_ref {:?}: {:?} -> {:?}", node, current, updated);
                if updated.is_zero() {
                    // SAFETY:
                    // Both counts are zero. No counted pointer names the node, and no thread
                    // holds a reference to it.
                    unsafe { free_node(node) };
                }
                return;
            }
            Err(actual) => current = NodeCount::unpack(actual),
        }
    }
}

/// Retire a counted pointer which has been removed from `head` or `tail`, and which
/// is thus no longer reachable from any atomic location.
///
/// The external count of `old` is the number of references acquired through it, plus
/// one for the baseline every counted pointer starts with. The remover's own reference
/// is consumed as well, so `external_count - 2` outstanding references are moved over to
/// the node's internal count, in the same atomic step that marks one of the node's
/// counted pointers as gone.
///
/// SAFETY:
/// `old` must have just been removed from its slot by the caller, and the caller must
/// own a reference acquired through it. The caller must not touch the node afterwards.
unsafe fn free_external_counter<T>(old: CountedPtr<T>) {
    let node = old.node;
    verify_node(node);
    let count_increase = old.external_count as i32 - 2;
    // SAFETY:
    // The caller's reference keeps the node alive until the update below.
    let count = unsafe { &(*node).count };
    let mut current = NodeCount::unpack(count.load(Ordering::Relaxed));
    loop {
        assert!(
            current.external_counters > 0,
            "Internal error in splitqueue: retiring {:?} with no external counters left",
            old
        );
        let updated = NodeCount {
            internal_count: current.internal_count + count_increase,
            external_counters: current.external_counters - 1,
        };
        match count.compare_exchange(
            current.pack(),
            updated.pack(),
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                debug_println!(
                    "free_external_counter {:?}: {:?} -> {:?}",
                    old,
                    current,
                    updated
                );
                if updated.is_zero() {
                    // SAFETY:
                    // Both counts are zero. No counted pointer names the node, and no thread
                    // holds a reference to it.
                    unsafe { free_node(node) };
                }
                return;
            }
            Err(actual) => current = NodeCount::unpack(actual),
        }
    }
}

impl<T> SplitQueue<T> {
    /// Create a new, empty queue.
    pub fn new() -> SplitQueue<T> {
        let node_tally = NodeTally::default();
        let sentinel = CountedPtr {
            external_count: 1,
            node: Node::allocate(&node_tally),
        };
        SplitQueue {
            head: AtomicCountedPtr::new(sentinel),
            tail: AtomicCountedPtr::new(sentinel),
            node_tally,
        }
    }

    /// Add a value at the back of the queue.
    ///
    /// This never fails and never waits for a consumer. It is lock free: it can only
    /// be delayed by other threads pushing at the same time.
    pub fn push(&self, value: T) {
        let payload = Box::into_raw(Box::new(value));
        let new_next = CountedPtr {
            external_count: 1,
            node: Node::allocate(&self.node_tally),
        };
        let mut old_tail = self.tail.load(Ordering::Relaxed);
        loop {
            increase_external_count(&self.tail, &mut old_tail);
            let tail_node = old_tail.node;
            verify_node(tail_node);
            // SAFETY:
            // We own a reference to tail_node, so it can't have been freed.
            let tail_ref = unsafe { &*tail_node };
            if tail_ref
                .data
                .compare_exchange(null_mut(), payload, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                // Only the thread that filled the data slot ever writes 'next'.
                tail_ref.next.store(new_next, Ordering::Release);
                let retired = self.tail.swap(new_next, Ordering::SeqCst);
                debug_assert!(retired.node == tail_node);
                debug_println!("push: filled {:?}, new tail {:?}", tail_node, new_next);
                // SAFETY:
                // 'retired' was just removed from 'tail', and we own a reference to it.
                unsafe { free_external_counter(retired) };
                return;
            }
            debug_println!("push: lost race for {:?}", tail_node);
            // Someone else filled this node. Wait for them to publish the new tail
            // before letting go, so the address can't be reused while we compare it.
            while self.tail.load(Ordering::Acquire).node == tail_node {
                atomic::spin_loop();
            }
            // SAFETY:
            // We own a reference to tail_node, and don't touch it after this.
            unsafe { release_ref(tail_node) };
            old_tail = self.tail.load(Ordering::Relaxed);
        }
    }

    /// Remove the value at the front of the queue, if any.
    ///
    /// Returns `None` if the queue was observed to be empty. This never blocks. It is
    /// lock free: it can only be delayed by other threads popping at the same time.
    pub fn pop(&self) -> Option<T> {
        let mut old_head = self.head.load(Ordering::Relaxed);
        loop {
            increase_external_count(&self.head, &mut old_head);
            let head_node = old_head.node;
            if head_node == self.tail.load(Ordering::SeqCst).node {
                debug_println!("pop: empty at {:?}", head_node);
                self.hand_back_head(old_head);
                return None;
            }
            verify_node(head_node);
            // SAFETY:
            // We own a reference to head_node, so it can't have been freed.
            let head_ref = unsafe { &*head_node };
            // head_node isn't the tail, so its successor has been linked.
            let next = head_ref.next.load(Ordering::Acquire);
            loop {
                match self
                    .head
                    .compare_exchange(old_head, next, Ordering::SeqCst, Ordering::Relaxed)
                {
                    Ok(_) => {
                        let payload =
                            head_ref.data.swap(consumed_marker(head_node), Ordering::SeqCst);
                        debug_println!("pop: advanced head {:?} -> {:?}", old_head, next);
                        // SAFETY:
                        // 'old_head' was just removed from 'head', and we own a reference to it.
                        unsafe { free_external_counter(old_head) };
                        if payload.is_null() || payload == consumed_marker(head_node) {
                            panic!("Internal error in splitqueue: popped node had no value");
                        }
                        // SAFETY:
                        // The payload was created by Box::into_raw in 'push'. Swapping it out
                        // of the data slot made us its only owner.
                        return Some(*unsafe { Box::from_raw(payload) });
                    }
                    Err(actual) if actual.node == head_node => {
                        // Only the count changed. Our increment is part of it.
                        debug_println!("pop: count changed on {:?}", actual);
                        old_head = actual;
                        atomic::spin_loop();
                    }
                    Err(actual) => {
                        // SAFETY:
                        // We own a reference to head_node, and don't touch it after this.
                        unsafe { release_ref(head_node) };
                        old_head = actual;
                        atomic::spin_loop();
                        break;
                    }
                }
            }
        }
    }

    /// Returns true if the queue was observed to be empty.
    ///
    /// Concurrent pushes and pops may change this at any moment, so the answer
    /// is only a snapshot.
    pub fn is_empty(&self) -> bool {
        let mut acquired = self.head.load(Ordering::Relaxed);
        increase_external_count(&self.head, &mut acquired);
        let empty = acquired.node == self.tail.load(Ordering::SeqCst).node;
        self.hand_back_head(acquired);
        empty
    }

    /// Give up a reference acquired through `head` without having retired anything.
    ///
    /// While `head` still names the acquired node, our increment is still part of its
    /// external count, and is simply taken back out. This keeps the count from growing
    /// while consumers poll an empty queue. Once `head` has moved on, the increment has
    /// been (or will be) transferred to the node, so release through the internal count.
    fn hand_back_head(&self, acquired: CountedPtr<T>) {
        let mut current = acquired;
        loop {
            debug_assert!(current.external_count >= 2);
            let undone = CountedPtr {
                external_count: current.external_count - 1,
                node: current.node,
            };
            match self
                .head
                .compare_exchange(current, undone, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => {
                    debug_println!("Handed back {:?}", current);
                    return;
                }
                Err(actual) if actual.node == acquired.node => {
                    current = actual;
                }
                Err(_) => {
                    // SAFETY:
                    // We own a reference to the acquired node, and don't touch it after this.
                    unsafe { release_ref(acquired.node) };
                    return;
                }
            }
        }
    }

    /// Walk the list from `head` to `tail`, checking the structural invariants of the
    /// queue. Returns the number of values in the queue. Panics if any invariant is broken.
    ///
    /// # Safety
    /// No other thread may be accessing the queue while this runs.
    pub unsafe fn debug_validate(&self) -> usize {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        for slot in [head, tail] {
            if slot.node.is_null() || slot.external_count == 0 {
                panic!("Internal error in splitqueue: bad head/tail pointer {:?}", slot);
            }
        }
        let mut values = 0;
        let mut cur = head;
        while cur.node != tail.node {
            verify_node(cur.node);
            // SAFETY:
            // The queue is quiescent, and every node from head to tail is alive.
            let node = unsafe { &*cur.node };
            let data = node.data.load(Ordering::SeqCst);
            if data.is_null() || data == consumed_marker(cur.node) {
                panic!("Internal error in splitqueue: node {:?} before tail holds no value", cur);
            }
            let next = node.next.load(Ordering::SeqCst);
            if next.node.is_null() || next.external_count == 0 {
                panic!("Internal error in splitqueue: node {:?} has bad next link {:?}", cur, next);
            }
            values += 1;
            cur = next;
        }
        verify_node(tail.node);
        // SAFETY:
        // The queue is quiescent, and the tail node is alive.
        let tail_node = unsafe { &*tail.node };
        if !tail_node.data.load(Ordering::SeqCst).is_null() {
            panic!("Internal error in splitqueue: tail node {:?} holds a value", tail);
        }
        if !tail_node.next.load(Ordering::SeqCst).node.is_null() {
            panic!("Internal error in splitqueue: tail node {:?} has a successor", tail);
        }
        debug_println!("debug_validate: {} values", values);
        values
    }
}

impl<T> Default for SplitQueue<T> {
    fn default() -> Self {
        SplitQueue::new()
    }
}

impl<T> Debug for SplitQueue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SplitQueue").finish_non_exhaustive()
    }
}

impl<T> Drop for SplitQueue<T> {
    fn drop(&mut self) {
        debug_println!("SplitQueue::drop");
        let mut drop_handler = DropHandler::default();
        while let Some(value) = self.pop() {
            drop_handler.do_drop_value(value);
        }
        let sentinel = self.head.load(Ordering::Relaxed);
        // SAFETY:
        // We have exclusive access. After draining, head and tail both name the
        // sentinel node, its slot is empty, and no thread holds a reference to it.
        unsafe { free_node(sentinel.node) };
        drop_handler.resume_any_panics();
    }
}

#[cfg(all(test, not(loom), not(feature = "shuttle")))]
mod no_std_tests;
