//! Walks through chaining, recovery, `finally` and the combinators.
//!
//! Run with `RUST_LOG=promise_chain=trace` to see settlement traces, or the
//! default filter to see only the double-settlement warning.
use promise_chain::{DeferredValue, Error, EventLoop, Handled, Resolution};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let event_loop = EventLoop::new()?;
    event_loop.block_on(async {
        let chained = DeferredValue::<u64>::new(|resolve, _| resolve.resolve(123))
            .then_ok(|value| {
                info!(value, "then");
                Ok(Resolution::Deferred(DeferredValue::<u64>::resolve(456).then_ok(|value| {
                    info!(value, "inner then");
                    Ok(Resolution::Deferred(DeferredValue::sleep(100)))
                })))
            })
            .then_ok(|value| -> Handled<u64> {
                info!(value, "then2");
                Err(Error::from("error occurred"))
            })
            .catch(|err| {
                info!(%err, "catch");
                Ok(Resolution::Deferred(DeferredValue::resolve(321)))
            })
            .finally(|| {
                info!("finally");
                Ok(Resolution::Value(()))
            })
            .await;
        info!(?chained, "chain settled");

        let all = DeferredValue::<u64>::all(vec![
            Resolution::Value(123),
            Resolution::Deferred(DeferredValue::resolve(456)),
            Resolution::Deferred(DeferredValue::sleep(100)),
            Resolution::Deferred(DeferredValue::sleep(23)),
        ])
        .await;
        info!(?all, "all");

        let race = DeferredValue::<u64>::race(vec![
            Resolution::Deferred(DeferredValue::sleep(100)),
            Resolution::Deferred(DeferredValue::sleep(23)),
            Resolution::Deferred(DeferredValue::sleep(13)),
        ])
        .await;
        info!(?race, "race");

        let twice = DeferredValue::<u64>::new(|resolve, reject| {
            resolve.resolve(123);
            reject.reject(Error::from("456"));
        });
        info!(outcome = ?twice.clone().await, "first settlement wins");
        tokio::task::yield_now().await;
    });
    Ok(())
}
