use crate::{DeferredValue, Error};

/// Anything exposing a `then`-shaped operation that reports one outcome to a
/// pair of callbacks. Handlers may hand such a value back and the enclosing
/// chain adopts whatever it reports.
///
/// Reporting both outcomes, or reporting twice, is harmless: only the first
/// settlement of the adopting chain takes effect.
///
/// # Examples
///
/// ```
/// use promise_chain::{DeferredValue, Error, EventLoop, Resolution, Thenable};
///
/// struct Ready(u8);
///
/// impl Thenable<u8, Error> for Ready {
///     fn then(self: Box<Self>, on_fulfilled: Box<dyn FnOnce(u8)>, _: Box<dyn FnOnce(Error)>) {
///         on_fulfilled(self.0)
///     }
/// }
///
/// let event_loop = EventLoop::new().unwrap();
/// let value = event_loop.block_on(async {
///     DeferredValue::<u8>::resolve(1)
///         .then_ok(|_| Ok(Resolution::<u8>::Thenable(Box::new(Ready(7)))))
///         .await
/// });
/// assert_eq!(value, Ok(7));
/// ```
pub trait Thenable<T, E = Error> {
    fn then(self: Box<Self>, on_fulfilled: Box<dyn FnOnce(T)>, on_rejected: Box<dyn FnOnce(E)>);
}

/// The value a handler produces for the next link of a chain.
pub enum Resolution<T, E = Error> {
    /// Settles the next link directly.
    Value(T),
    /// Flattened: the next link follows this instance's eventual outcome.
    Deferred(DeferredValue<T, E>),
    /// Flattened through the [`Thenable`] capability.
    Thenable(Box<dyn Thenable<T, E>>),
}

/// What `then`, `catch` and `finally` handlers return. `Err` plays the part
/// of a thrown exception and rejects the enclosing chain.
pub type Handled<T, E = Error> = Result<Resolution<T, E>, E>;

/// True when `resolution` has to be flattened instead of being used as is.
pub fn is_thenable<T, E>(resolution: &Resolution<T, E>) -> bool {
    !matches!(resolution, Resolution::Value(_))
}

impl<T, E> Resolution<T, E> {
    pub fn is_thenable(&self) -> bool {
        is_thenable(self)
    }
}

impl<T, E> Resolution<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Route the eventual outcome to one of the callbacks. Plain values are
    /// delivered synchronously.
    pub(crate) fn subscribe<F, R>(self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(E) + 'static,
    {
        match self {
            Resolution::Value(value) => on_fulfilled(value),
            Resolution::Deferred(deferred) => deferred.subscribe(on_fulfilled, on_rejected),
            Resolution::Thenable(thenable) => {
                thenable.then(Box::new(on_fulfilled), Box::new(on_rejected))
            }
        }
    }
}

impl<T, E> From<T> for Resolution<T, E> {
    fn from(value: T) -> Self {
        Resolution::Value(value)
    }
}

impl<T, E> From<DeferredValue<T, E>> for Resolution<T, E> {
    fn from(deferred: DeferredValue<T, E>) -> Self {
        Resolution::Deferred(deferred)
    }
}

impl<T, E> From<Box<dyn Thenable<T, E>>> for Resolution<T, E> {
    fn from(thenable: Box<dyn Thenable<T, E>>) -> Self {
        Resolution::Thenable(thenable)
    }
}

impl<T: std::fmt::Debug, E> std::fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Deferred(deferred) => f.debug_tuple("Deferred").field(&deferred.id()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}
