//! Deferred task queue and delayed execution, both borrowed from the tokio
//! `LocalSet` the caller runs in.
use crate::Error;
use std::time::Duration;

/// Run `task` on a later turn of the local task queue, after every task
/// queued before it.
///
/// # Panics
///
/// Panics when called outside of a [`LocalSet`](tokio::task::LocalSet) context.
pub(crate) fn queue_microtask<F>(task: F)
where
    F: FnOnce() + 'static,
{
    tokio::task::spawn_local(async move { task() });
}

/// Run `task` once `delay` has elapsed. Fails without queueing anything when
/// no tokio runtime is reachable from the calling thread.
pub(crate) fn schedule_after<F>(delay: Duration, task: F) -> Result<(), Error>
where
    F: FnOnce() + 'static,
{
    tokio::runtime::Handle::try_current().map_err(|e| Error::Timer(e.to_string()))?;
    tokio::task::spawn_local(async move {
        tokio::time::sleep(delay).await;
        task()
    });
    Ok(())
}
