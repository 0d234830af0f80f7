//! This module contains routines to help ensure that panicking drop-implementations
//! of queued values do not cause queue nodes to leak while the queue tears itself down.
//! The strategy to achieve this differs depending on if we run in `no_std` case or not.
//! While running in `no_std`, dropping is deferred until after all nodes have been freed,
//! at some extra cost.
//! When not using `no_std`, `catch_unwind` is used to catch panics and resume them
//! when it is safe.

pub(crate) trait IDropHandler<T> {
    /// Drop `value` now, or schedule it to be dropped by `resume_any_panics`.
    fn do_drop_value(&mut self, value: T);
    /// Call this once all queue memory has been released.
    fn resume_any_panics(self);
}

#[cfg(feature = "std")]
pub(crate) mod std_drop_handler;

#[cfg(not(feature = "std"))]
pub(crate) mod no_std_drop_handler;

#[cfg(feature = "std")]
pub(crate) use std_drop_handler::DropHandler;

#[cfg(not(feature = "std"))]
pub(crate) use no_std_drop_handler::DropHandler;
