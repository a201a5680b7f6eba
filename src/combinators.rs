use crate::{queue, DeferredValue, Error, Resolution};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

struct AllProgress<T> {
    results: Vec<Option<T>>,
    remaining: usize,
    failed: bool,
}

impl<T, E> DeferredValue<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// An instance settled from `value`. Deferred values and thenables are
    /// adopted, anything else fulfills as is.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{DeferredValue, EventLoop};
    ///
    /// let event_loop = EventLoop::new().unwrap();
    /// let nested = event_loop.block_on(async {
    ///     let inner = DeferredValue::<i32>::resolve(5);
    ///     let middle: DeferredValue<i32> = DeferredValue::resolve(inner);
    ///     let outer: DeferredValue<i32> = DeferredValue::resolve(middle);
    ///     outer.await
    /// });
    /// assert_eq!(nested, Ok(5));
    /// ```
    pub fn resolve<R>(value: R) -> Self
    where
        R: Into<Resolution<T, E>>,
    {
        let resolution = value.into();
        Self::new(move |resolve, reject| {
            resolution.subscribe(
                move |value| resolve.resolve(value),
                move |reason| reject.reject(reason),
            )
        })
    }

    /// An instance rejected with `reason`, verbatim.
    pub fn reject(reason: E) -> Self {
        Self::new(move |_, reject| reject.reject(reason))
    }

    /// Fulfills with every entry's value, in input order, once all of them
    /// have fulfilled. Rejects with the first rejection observed. Plain
    /// values count as fulfilled immediately; an empty input fulfills with
    /// an empty `Vec`.
    pub fn all<I>(items: I) -> DeferredValue<Vec<T>, E>
    where
        I: IntoIterator<Item = Resolution<T, E>>,
    {
        let items: Vec<_> = items.into_iter().collect();
        DeferredValue::new(move |resolve, reject| {
            if items.is_empty() {
                resolve.resolve(Vec::new());
                return;
            }
            let progress = Rc::new(RefCell::new(AllProgress {
                results: vec![None; items.len()],
                remaining: items.len(),
                failed: false,
            }));
            for (index, item) in items.into_iter().enumerate() {
                let (on_value, on_reason) = (progress.clone(), progress.clone());
                let (resolve, reject) = (resolve.clone(), reject.clone());
                item.subscribe(
                    move |value| {
                        let mut progress = on_value.borrow_mut();
                        if progress.failed {
                            return;
                        }
                        progress.results[index] = Some(value);
                        progress.remaining -= 1;
                        if progress.remaining == 0 {
                            resolve.resolve(progress.results.drain(..).flatten().collect());
                        }
                    },
                    move |reason| {
                        let mut progress = on_reason.borrow_mut();
                        if !progress.failed {
                            progress.failed = true;
                            reject.reject(reason);
                        }
                    },
                );
            }
        })
    }

    /// Settles like whichever entry settles first. Plain values settle
    /// immediately, so the first plain value in `items` wins over any
    /// pending entry. An empty input never settles.
    pub fn race<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Resolution<T, E>>,
    {
        Self::new(move |resolve, reject| {
            let done = Rc::new(Cell::new(false));
            for item in items {
                let (on_value, on_reason) = (done.clone(), done.clone());
                let (resolve, reject) = (resolve.clone(), reject.clone());
                item.subscribe(
                    move |value| {
                        if !on_value.replace(true) {
                            resolve.resolve(value);
                        }
                    },
                    move |reason| {
                        if !on_reason.replace(true) {
                            reject.reject(reason);
                        }
                    },
                );
            }
        })
    }
}

impl<E> DeferredValue<u64, E>
where
    E: Clone + From<Error> + 'static,
{
    /// Fulfills with `ms` after `ms` milliseconds. Rejects with
    /// [`Error::Timer`] when the delay cannot be scheduled.
    pub fn sleep(ms: u64) -> Self {
        Self::new(move |resolve, reject| {
            if let Err(e) = queue::schedule_after(Duration::from_millis(ms), move || resolve.resolve(ms)) {
                reject.reject(e.into());
            }
        })
    }
}
