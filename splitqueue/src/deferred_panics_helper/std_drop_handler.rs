use crate::deferred_panics_helper::IDropHandler;
use alloc::boxed::Box;
use core::any::Any;
use core::marker::PhantomData;

/// A drop handler that will persist the first panic, allowing it
/// to be unwinded later
pub(crate) struct DropHandler<T> {
    panic: Option<Box<dyn Any + Send + 'static>>,
    phantom: PhantomData<fn(T)>,
}

impl<T> Default for DropHandler<T> {
    fn default() -> Self {
        Self {
            panic: None,
            phantom: PhantomData,
        }
    }
}

impl<T> IDropHandler<T> for DropHandler<T> {
    fn do_drop_value(&mut self, value: T) {
        self.run(move || {
            debug_println!("dropping drained value (std drop)");
            drop(value);
        });
    }

    fn resume_any_panics(self) {
        if let Some(panic) = self.panic {
            debug_println!("Resuming panic from drained value");
            std::panic::resume_unwind(panic);
        }
    }
}

impl<T> DropHandler<T> {
    fn run(&mut self, job: impl FnOnce()) {
        // The queue's own state never depends on the payload. Only the first panic is kept.
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            Ok(()) => {}
            Err(err) => {
                self.panic.get_or_insert(err);
            }
        }
    }
}
