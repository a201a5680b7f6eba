//! Factory entry points for conformance suites: an instance already on the
//! fulfillment track, one already on the rejection track, and a pending one
//! whose settlement hooks are exposed for manual triggering.
use crate::{DeferredValue, Error, Rejecter, Resolution, Resolver};

/// A pending instance together with its settlement hooks.
///
/// # Examples
///
/// ```
/// use promise_chain::{adapter, Error, EventLoop};
///
/// let event_loop = EventLoop::new().unwrap();
/// let value = event_loop.block_on(async {
///     let deferred = adapter::deferred::<&str, Error>();
///     deferred.resolve.resolve("🍓");
///     deferred.promise.await
/// });
/// assert_eq!(value, Ok("🍓"));
/// ```
#[derive(Debug, Clone)]
pub struct Deferred<T, E = Error> {
    pub promise: DeferredValue<T, E>,
    pub resolve: Resolver<T, E>,
    pub reject: Rejecter<T, E>,
}

pub fn resolved<T, E>(value: T) -> DeferredValue<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    DeferredValue::resolve(Resolution::Value(value))
}

pub fn rejected<T, E>(reason: E) -> DeferredValue<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    DeferredValue::reject(reason)
}

pub fn deferred<T, E>() -> Deferred<T, E> {
    let promise = DeferredValue::pending();
    let (resolve, reject) = promise.hooks();
    Deferred {
        promise,
        resolve,
        reject,
    }
}
