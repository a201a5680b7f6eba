//! The single-threaded host every [`DeferredValue`](crate::DeferredValue)
//! lives on.
use crate::Error;
use std::future::Future;
use tokio::{
    runtime::{Builder, Runtime},
    task::LocalSet,
};

/// A current-thread tokio runtime paired with a [`LocalSet`]. Settlement
/// work and `sleep` timers are queued on the local set, so every deferred
/// value has to be created from inside [`EventLoop::block_on`] (or another
/// `LocalSet` context).
///
/// # Examples
///
/// ```
/// use promise_chain::{DeferredValue, EventLoop};
///
/// let event_loop = EventLoop::new().unwrap();
/// let slept = event_loop.block_on(async { DeferredValue::<u64>::sleep(5).await });
/// assert_eq!(slept, Ok(5));
/// ```
#[derive(Debug)]
pub struct EventLoop {
    runtime: Runtime,
    local: LocalSet,
}

impl EventLoop {
    pub fn new() -> Result<Self, Error> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Runtime(e.to_string()))?;
        Ok(Self {
            runtime,
            local: LocalSet::new(),
        })
    }

    /// Drive `future` to completion, running queued settlement work in
    /// between. Tasks still queued when `future` finishes stay queued for the
    /// next call.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.local.block_on(&self.runtime, future)
    }
}
