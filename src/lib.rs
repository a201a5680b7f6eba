//! A chainable deferred value. A [`DeferredValue`] starts pending, settles
//! exactly once to a value or a rejection reason, and runs the continuations
//! registered through [`then`](DeferredValue::then),
//! [`catch`](DeferredValue::catch) and [`finally`](DeferredValue::finally) on a
//! later turn of the event loop.
//!
//! Settlement work is queued on a tokio [`LocalSet`](tokio::task::LocalSet),
//! so every deferred value has to be created and chained inside one. The
//! [`EventLoop`] bundles a current-thread runtime with a local set.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{DeferredValue, Error, EventLoop, Resolution};
//!
//! let event_loop = EventLoop::new().unwrap();
//! let value = event_loop.block_on(async {
//!     DeferredValue::<i32>::resolve(20)
//!         .then_ok(|v| Ok(Resolution::Value(v + 1)))
//!         .then_ok(|v| Ok(Resolution::Deferred(DeferredValue::resolve(v * 2))))
//!         .await
//! });
//! assert_eq!(value, Ok(42));
//!
//! let recovered = event_loop.block_on(async {
//!     DeferredValue::<&str>::reject(Error::from("boom"))
//!         .catch(|_| Ok(Resolution::Value("ok")))
//!         .await
//! });
//! assert_eq!(recovered, Ok("ok"));
//! ```
pub mod adapter;
mod combinators;
mod deferred;
mod queue;
pub mod runtime;
mod thenable;

pub use deferred::{DeferredValue, Rejecter, Resolver, State};
pub use runtime::EventLoop;
pub use thenable::{is_thenable, Handled, Resolution, Thenable};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A handler produced the very chain instance it was meant to settle.
    #[error("circular reference")]
    CircularReference,
    #[error("timer unavailable: {0}")]
    Timer(String),
    #[error("failed to start event loop: {0}")]
    Runtime(String),
    /// Arbitrary rejection reason supplied by user code.
    #[error("{0}")]
    Reason(String),
}

impl From<&str> for Error {
    fn from(reason: &str) -> Self {
        Error::Reason(reason.to_owned())
    }
}

impl From<String> for Error {
    fn from(reason: String) -> Self {
        Error::Reason(reason)
    }
}
