use crate::{
    queue,
    thenable::{is_thenable, Handled, Resolution},
    Error,
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    mem,
    pin::Pin,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll, Waker},
};
use tracing::{trace, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`DeferredValue`]. The only transitions are
/// `Pending -> Fulfilled` and `Pending -> Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Pending => f.write_str("pending"),
            State::Fulfilled => f.write_str("fulfilled"),
            State::Rejected => f.write_str("rejected"),
        }
    }
}

type Continuation<V> = Box<dyn FnOnce(V)>;

struct Inner<T, E> {
    id: u64,
    outcome: Option<Result<T, E>>,
    on_fulfilled: Vec<Continuation<T>>,
    on_rejected: Vec<Continuation<E>>,
    wakers: Vec<Waker>,
}

impl<T, E> Inner<T, E> {
    fn state(&self) -> State {
        match self.outcome {
            None => State::Pending,
            Some(Ok(_)) => State::Fulfilled,
            Some(Err(_)) => State::Rejected,
        }
    }
}

/// A single-assignment asynchronous container.
///
/// Cloning is cheap and every clone observes the same instance. The value
/// also implements [`Future`], resolving to a clone of the settled outcome.
///
/// # Examples
///
/// ```
/// use promise_chain::{DeferredValue, EventLoop, Resolution};
///
/// let event_loop = EventLoop::new().unwrap();
/// let value = event_loop.block_on(async {
///     let deferred = DeferredValue::<String>::new(|resolve, _reject| {
///         resolve.resolve("🍓".to_owned());
///     });
///     assert!(!deferred.is_settled());
///     deferred.then_ok(|v| Ok(Resolution::Value(v.len()))).await
/// });
/// assert_eq!(value, Ok(4));
/// ```
pub struct DeferredValue<T, E = Error> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

/// Settlement hook handed to the executor: fulfills its instance.
pub struct Resolver<T, E = Error> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

/// Settlement hook handed to the executor: rejects its instance.
pub struct Rejecter<T, E = Error> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for DeferredValue<T, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, E> Clone for Rejecter<T, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, E> fmt::Debug for DeferredValue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DeferredValue")
            .field("id", &inner.id)
            .field("state", &inner.state())
            .finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolver").field(&self.inner.borrow().id).finish()
    }
}

impl<T, E> fmt::Debug for Rejecter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rejecter").field(&self.inner.borrow().id).finish()
    }
}

impl<T, E> DeferredValue<T, E> {
    pub(crate) fn pending() -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        trace!(id, "deferred value created");
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id,
                outcome: None,
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    pub(crate) fn hooks(&self) -> (Resolver<T, E>, Rejecter<T, E>) {
        (
            Resolver { inner: self.inner.clone() },
            Rejecter { inner: self.inner.clone() },
        )
    }

    /// Process-unique debug identity.
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn state(&self) -> State {
        self.inner.borrow().state()
    }

    /// True once the instance is fulfilled or rejected.
    pub fn is_settled(&self) -> bool {
        self.state() != State::Pending
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Queue fulfillment with `value`. Does nothing observable if the
    /// instance has settled by the time the queued work runs.
    pub fn resolve(&self, value: T) {
        let inner = self.inner.clone();
        queue::queue_microtask(move || settle(&inner, Ok(value)));
    }
}

impl<T, E> Rejecter<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Queue rejection with `reason`. Does nothing observable if the
    /// instance has settled by the time the queued work runs.
    pub fn reject(&self, reason: E) {
        let inner = self.inner.clone();
        queue::queue_microtask(move || settle(&inner, Err(reason)));
    }
}

/// Store the outcome and fire the matching continuation list, in
/// registration order. A second settlement is dropped with a warning.
fn settle<T: Clone, E: Clone>(inner: &Rc<RefCell<Inner<T, E>>>, outcome: Result<T, E>) {
    let (id, on_fulfilled, on_rejected, wakers) = {
        let mut inner = inner.borrow_mut();
        if inner.outcome.is_some() {
            warn!(id = inner.id, state = %inner.state(), "deferred value is already settled");
            return;
        }
        inner.outcome = Some(outcome.clone());
        (
            inner.id,
            mem::take(&mut inner.on_fulfilled),
            mem::take(&mut inner.on_rejected),
            mem::take(&mut inner.wakers),
        )
    };
    trace!(id, fulfilled = outcome.is_ok(), continuations = on_fulfilled.len(), "settled");
    match outcome {
        Ok(value) => on_fulfilled.into_iter().for_each(|next| next(value.clone())),
        Err(reason) => on_rejected.into_iter().for_each(|next| next(reason.clone())),
    }
    wakers.into_iter().for_each(Waker::wake);
}

impl<T, E> DeferredValue<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Create a pending instance and run `executor` synchronously with its
    /// settlement hooks. The hooks only queue the settlement; continuations
    /// never run before `new` returns.
    ///
    /// A panic inside `executor` unwinds out of `new`; the instance is not
    /// rejected.
    pub fn new<X>(executor: X) -> Self
    where
        X: FnOnce(Resolver<T, E>, Rejecter<T, E>),
    {
        let deferred = Self::pending();
        let (resolve, reject) = deferred.hooks();
        executor(resolve, reject);
        deferred
    }

    /// Like [`new`](Self::new) for a fallible executor. An `Err` from the
    /// executor is handed back to the caller instead of rejecting the
    /// instance.
    pub fn try_new<X>(executor: X) -> Result<Self, E>
    where
        X: FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), E>,
    {
        let deferred = Self::pending();
        let (resolve, reject) = deferred.hooks();
        executor(resolve, reject)?;
        Ok(deferred)
    }

    /// Register raw continuations. On an instance that already settled, the
    /// matching continuation is queued with the stored outcome.
    pub(crate) fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(E) + 'static,
    {
        let settled = self.inner.borrow().outcome.clone();
        match settled {
            None => {
                let mut inner = self.inner.borrow_mut();
                trace!(id = inner.id, "continuation registered");
                inner.on_fulfilled.push(Box::new(on_fulfilled));
                inner.on_rejected.push(Box::new(on_rejected));
            }
            Some(Ok(value)) => queue::queue_microtask(move || on_fulfilled(value)),
            Some(Err(reason)) => queue::queue_microtask(move || on_rejected(reason)),
        }
    }

    /// Chain both tracks. Whichever handler runs, its produced value settles
    /// the returned instance, flattening deferred values and thenables. A
    /// handled rejection fulfills the returned instance; an `Err` from
    /// either handler rejects it.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> DeferredValue<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Handled<U, E> + 'static,
        R: FnOnce(E) -> Handled<U, E> + 'static,
    {
        let chain = DeferredValue::pending();
        let chain_id = chain.id();
        let (resolve, reject) = chain.hooks();
        let (resolve_err, reject_err) = (resolve.clone(), reject.clone());
        self.subscribe(
            move |value| adopt(chain_id, on_fulfilled(value), resolve, reject),
            move |reason| adopt(chain_id, on_rejected(reason), resolve_err, reject_err),
        );
        chain
    }

    /// [`then`](Self::then) without a rejection handler: rejections pass
    /// through unchanged.
    pub fn then_ok<U, F>(&self, on_fulfilled: F) -> DeferredValue<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Handled<U, E> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// [`then`](Self::then) without a fulfillment handler: the value passes
    /// through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> DeferredValue<T, E>
    where
        R: FnOnce(E) -> Handled<T, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// Run `on_finally` on either track, then pass the original outcome on.
    ///
    /// A deferred or thenable result delays the returned instance until it
    /// settles. An `Err` from `on_finally`, or a rejection of what it
    /// produced, replaces the original outcome.
    pub fn finally<X, F>(&self, on_finally: F) -> DeferredValue<T, E>
    where
        X: Clone + 'static,
        F: FnOnce() -> Handled<X, E> + 'static,
    {
        let chain = DeferredValue::pending();
        let (resolve, reject) = chain.hooks();
        let reject_err = reject.clone();
        let finalizer = Rc::new(Cell::new(Some(on_finally)));
        let finalizer_err = finalizer.clone();
        self.subscribe(
            move |value| {
                if let Some(on_finally) = finalizer.take() {
                    match on_finally() {
                        Err(reason) => reject.reject(reason),
                        Ok(produced) => produced.subscribe(
                            move |_| resolve.resolve(value),
                            move |reason| reject.reject(reason),
                        ),
                    }
                }
            },
            move |original| {
                if let Some(on_finally) = finalizer_err.take() {
                    match on_finally() {
                        Err(reason) => reject_err.reject(reason),
                        Ok(produced) => {
                            let keep = reject_err.clone();
                            produced.subscribe(
                                move |_| keep.reject(original),
                                move |reason| reject_err.reject(reason),
                            )
                        }
                    }
                }
            },
        );
        chain
    }
}

/// Settle the chain `chain_id` from a handler's produced value.
fn adopt<U, E>(chain_id: u64, produced: Handled<U, E>, resolve: Resolver<U, E>, reject: Rejecter<U, E>)
where
    U: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    let produced = match produced {
        Ok(produced) => produced,
        Err(reason) => return reject.reject(reason),
    };
    if is_thenable(&produced) {
        if let Resolution::Deferred(deferred) = &produced {
            if deferred.id() == chain_id {
                return reject.reject(Error::CircularReference.into());
            }
        }
    }
    produced.subscribe(
        move |value| resolve.resolve(value),
        move |reason| reject.reject(reason),
    )
}

impl<T: Clone, E: Clone> Future for DeferredValue<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.outcome {
            Some(ref outcome) => Poll::Ready(outcome.clone()),
            None => {
                if !inner.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeferredValue, State};
    use crate::{Error, EventLoop, Resolution};
    use std::{cell::RefCell, future::Future, rc::Rc};

    #[test]
    fn test_settlement_is_deferred() {
        let event_loop = EventLoop::new().unwrap();
        event_loop.block_on(async {
            let deferred = DeferredValue::<i32>::new(|resolve, _| resolve.resolve(1));
            assert_eq!(deferred.state(), State::Pending);
            assert_eq!(deferred.clone().await, Ok(1));
            assert_eq!(deferred.state(), State::Fulfilled);
            assert!(deferred.is_settled());
        });
    }

    #[test]
    fn test_second_settlement_is_ignored() {
        let event_loop = EventLoop::new().unwrap();
        event_loop.block_on(async {
            let deferred = DeferredValue::<i32>::new(|resolve, reject| {
                resolve.resolve(123);
                reject.reject(Error::from("456"));
                resolve.resolve(789);
            });
            assert_eq!(deferred.clone().await, Ok(123));
            tokio::task::yield_now().await;
            assert_eq!(deferred.state(), State::Fulfilled);
            assert_eq!(deferred.await, Ok(123));
        });
    }

    #[test]
    fn test_rejection_wins_when_queued_first() {
        let event_loop = EventLoop::new().unwrap();
        let outcome = event_loop.block_on(async {
            DeferredValue::<i32>::new(|resolve, reject| {
                reject.reject(Error::from("first"));
                resolve.resolve(1);
            })
            .await
        });
        assert_eq!(outcome, Err(Error::from("first")));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = DeferredValue::<i32>::pending();
        let b = DeferredValue::<i32>::pending();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_try_new_propagates_executor_error() {
        let event_loop = EventLoop::new().unwrap();
        event_loop.block_on(async {
            let failed = DeferredValue::<i32>::try_new(|_, _| Err(Error::from("executor")));
            assert_eq!(failed.unwrap_err(), Error::from("executor"));
            let made = DeferredValue::<i32>::try_new(|resolve, _| {
                resolve.resolve(2);
                Ok(())
            });
            assert_eq!(made.unwrap().await, Ok(2));
        });
    }

    #[test]
    #[should_panic(expected = "executor blew up")]
    fn test_executor_panic_escapes_constructor() {
        let _ = DeferredValue::<i32>::new(|_, _| panic!("executor blew up"));
    }

    #[test]
    fn test_then_handler_error_rejects_chain() {
        let event_loop = EventLoop::new().unwrap();
        let outcome = event_loop.block_on(async {
            DeferredValue::<i32>::resolve(1)
                .then_ok(|_| -> crate::Handled<i32> { Err(Error::from("thrown")) })
                .await
        });
        assert_eq!(outcome, Err(Error::from("thrown")));
    }

    #[test]
    fn test_rejection_passes_through_then_ok() {
        let event_loop = EventLoop::new().unwrap();
        let outcome = event_loop.block_on(async {
            DeferredValue::<i32>::reject(Error::from("e"))
                .then_ok(|v| Ok(Resolution::Value(v + 1)))
                .then_ok(|v| Ok(Resolution::Value(v * 2)))
                .await
        });
        assert_eq!(outcome, Err(Error::from("e")));
    }

    #[test]
    fn test_rejection_handler_fulfills_chain() {
        let event_loop = EventLoop::new().unwrap();
        let outcome = event_loop.block_on(async {
            DeferredValue::<i32>::reject(Error::from("e"))
                .then(|v| Ok(Resolution::Value(v)), |_| Ok(Resolution::Value(123456)))
                .await
        });
        assert_eq!(outcome, Ok(123456));
    }

    #[test]
    fn test_circular_chain_is_rejected() {
        let event_loop = EventLoop::new().unwrap();
        let outcome = event_loop.block_on(async {
            let slot: Rc<RefCell<Option<DeferredValue<i32>>>> = Rc::new(RefCell::new(None));
            let own = slot.clone();
            let chain = DeferredValue::<i32>::resolve(123).then_ok(move |_| {
                match own.borrow_mut().take() {
                    Some(itself) => Ok(Resolution::Deferred(itself)),
                    None => Ok(Resolution::Value(0)),
                }
            });
            *slot.borrow_mut() = Some(chain.clone());
            chain.await
        });
        assert_eq!(outcome, Err(Error::CircularReference));
    }

    #[test]
    fn test_finally_keeps_value_and_error() {
        let event_loop = EventLoop::new().unwrap();
        event_loop.block_on(async {
            let kept = DeferredValue::<i32>::resolve(7)
                .finally(|| Ok(Resolution::Value(())))
                .await;
            assert_eq!(kept, Ok(7));
            let rethrown = DeferredValue::<i32>::reject(Error::from("e"))
                .finally(|| Ok(Resolution::Value(())))
                .await;
            assert_eq!(rethrown, Err(Error::from("e")));
        });
    }

    #[test]
    fn test_finally_error_replaces_outcome() {
        let event_loop = EventLoop::new().unwrap();
        event_loop.block_on(async {
            let replaced = DeferredValue::<i32>::resolve(7)
                .finally(|| -> crate::Handled<()> { Err(Error::from("finally")) })
                .await;
            assert_eq!(replaced, Err(Error::from("finally")));
            let inner_rejected = DeferredValue::<i32>::reject(Error::from("original"))
                .finally(|| Ok(Resolution::Deferred(DeferredValue::<()>::reject(Error::from("inner")))))
                .await;
            assert_eq!(inner_rejected, Err(Error::from("inner")));
        });
    }

    #[test]
    fn test_finally_inner_rejection_replaces_value() {
        let event_loop = EventLoop::new().unwrap();
        let outcome = event_loop.block_on(async {
            DeferredValue::<i32>::resolve(7)
                .finally(|| Ok(Resolution::Deferred(DeferredValue::<()>::reject(Error::from("inner")))))
                .await
        });
        assert_eq!(outcome, Err(Error::from("inner")));
    }

    #[test]
    fn test_circular_chain_from_rejection_handler_is_rejected() {
        let event_loop = EventLoop::new().unwrap();
        let outcome = event_loop.block_on(async {
            let slot: Rc<RefCell<Option<DeferredValue<i32>>>> = Rc::new(RefCell::new(None));
            let own = slot.clone();
            let chain = DeferredValue::<i32>::reject(Error::from("e")).then(
                |v| Ok(Resolution::Value(v)),
                move |_| match own.borrow_mut().take() {
                    Some(itself) => Ok(Resolution::Deferred(itself)),
                    None => Ok(Resolution::Value(0)),
                },
            );
            *slot.borrow_mut() = Some(chain.clone());
            chain.await
        });
        assert_eq!(outcome, Err(Error::CircularReference));
    }

    #[test]
    fn test_finally_waits_for_deferred_result() {
        let event_loop = EventLoop::new().unwrap();
        event_loop.block_on(async {
            let log = Rc::new(RefCell::new(Vec::new()));
            let sleeper = log.clone();
            let value = DeferredValue::<&str>::resolve("value")
                .finally(move || {
                    Ok(Resolution::Deferred(DeferredValue::<u64>::sleep(10).then_ok(
                        move |ms| {
                            sleeper.borrow_mut().push(ms);
                            Ok(Resolution::Value(ms))
                        },
                    )))
                })
                .await;
            assert_eq!(value, Ok("value"));
            assert_eq!(*log.borrow(), vec![10]);
        });
    }

    #[test]
    fn test_waker_registered_once_per_task() {
        let event_loop = EventLoop::new().unwrap();
        event_loop.block_on(async {
            let deferred = DeferredValue::<i32>::pending();
            let mut polled = deferred.clone();
            futures::future::poll_fn(|cx| {
                let _ = std::pin::Pin::new(&mut polled).poll(cx);
                let _ = std::pin::Pin::new(&mut polled).poll(cx);
                std::task::Poll::Ready(())
            })
            .await;
            assert_eq!(deferred.inner.borrow().wakers.len(), 1);
        });
    }
}
