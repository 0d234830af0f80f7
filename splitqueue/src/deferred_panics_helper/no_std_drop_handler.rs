use crate::deferred_panics_helper::IDropHandler;
use alloc::vec::Vec;

/// A drop handler that keeps every value alive until all nodes have been
/// freed, and only then drops them.
pub(crate) struct DropHandler<T> {
    deferred: Vec<T>,
}

impl<T> Default for DropHandler<T> {
    #[cfg_attr(test, mutants::skip)]
    fn default() -> Self {
        Self {
            deferred: Vec::new(),
        }
    }
}

impl<T> IDropHandler<T> for DropHandler<T> {
    #[cfg_attr(test, mutants::skip)]
    fn do_drop_value(&mut self, value: T) {
        debug_println!("Scheduling drop of drained value");
        self.deferred.push(value);
    }

    #[cfg_attr(test, mutants::skip)]
    fn resume_any_panics(self) {
        let mut tself = self;
        debug_println!("Dropping {} deferred values", tself.deferred.len());
        tself.deferred.clear()
    }
}
