//! Helpers for keeping track of allocated instance counts,
//! detecting when instances are leaked or dropped twice.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::Ordering;
use std::sync::Mutex;

/// A little helper struct that just keeps track of the number of live
/// instances of it. Every queue node carries one in tests, so the
/// count tells us how many nodes are currently allocated.
pub(crate) struct InstanceSpy {
    x: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}
impl InstanceSpy {
    pub(crate) fn new(x: std::sync::Arc<std::sync::atomic::AtomicUsize>) -> InstanceSpy {
        let _temp = x.fetch_add(1, Ordering::Relaxed);
        debug_println!("++ InstanceSpy ++ {}", _temp + 1);
        InstanceSpy { x }
    }
}
impl Drop for InstanceSpy {
    fn drop(&mut self) {
        let _prev = self.x.fetch_sub(1, Ordering::Relaxed);
        debug_println!("-- InstanceSpy -- drop {}", _prev - 1);
    }
}

/// A handle to the live-node counter of a queue. It stays valid after
/// the queue itself has been dropped.
pub(crate) struct NodeTally(std::sync::Arc<std::sync::atomic::AtomicUsize>);

impl NodeTally {
    pub(crate) fn of<T>(queue: &crate::SplitQueue<T>) -> NodeTally {
        NodeTally(queue.node_tally.clone())
    }
    pub(crate) fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
    pub(crate) fn validate(&self) {
        let live = self.live();
        if live != 0 {
            panic!("Leaked {} queue nodes", live);
        }
    }
}

/// Owner of a set of uniquely numbered spies. Creating a spy with an
/// id that is already alive, or dropping one that isn't, panics.
pub(crate) struct SpyOwner2 {
    data: std::sync::Arc<Mutex<HashSet<u32>>>,
}

impl SpyOwner2 {
    pub(crate) fn new() -> SpyOwner2 {
        SpyOwner2 {
            data: std::sync::Arc::new(Mutex::new(HashSet::new())),
        }
    }
    pub(crate) fn create(&self, id: u32) -> InstanceSpy2 {
        InstanceSpy2::new(self.data.clone(), id)
    }
    pub(crate) fn count(&self) -> usize {
        self.data.lock().unwrap().len()
    }
    pub(crate) fn alive(&self) -> HashSet<u32> {
        self.data.lock().unwrap().clone()
    }
    pub(crate) fn validate(&self) {
        let guard = self.data.lock().unwrap();
        if guard.len() > 0 {
            panic!("Leaked: {:?}", &*guard);
        }
    }
}

#[derive(Debug)]
pub(crate) struct InstanceSpy2 {
    x: std::sync::Arc<Mutex<HashSet<u32>>>,
    id: u32,
}

impl Hash for InstanceSpy2 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}
impl PartialEq<Self> for InstanceSpy2 {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InstanceSpy2 {}

impl InstanceSpy2 {
    pub(crate) fn id(&self) -> u32 {
        self.id
    }
    fn new(x: std::sync::Arc<Mutex<HashSet<u32>>>, id: u32) -> InstanceSpy2 {
        let mut guard = x.lock().unwrap();
        if !guard.insert(id) {
            panic!("Spy {} created twice", id);
        }
        debug_println!("++ InstanceSpy2 ++ {:?} (added: {})", &*guard, id);
        drop(guard);
        InstanceSpy2 { x, id }
    }
}
impl Drop for InstanceSpy2 {
    fn drop(&mut self) {
        let mut guard = self.x.lock().unwrap();
        if !guard.remove(&self.id) {
            panic!("Spy {} dropped twice", self.id);
        }
        debug_println!("-- InstanceSpy2 -- {:?} - removed {}", &*guard, self.id);
    }
}
