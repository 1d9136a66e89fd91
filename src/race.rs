//! Bounded polling and timeout races used while waiting on the page.

use std::future::Future;
use std::time::Duration;

/// Outcome of [`first_or_timeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raced<T> {
    Event(T),
    TimedOut,
}

/// Waits for `event` or `timeout`, whichever comes first. The loser is
/// dropped, which cancels it.
pub async fn first_or_timeout<F>(event: F, timeout: Duration) -> Raced<F::Output>
where
    F: Future,
{
    tokio::select! {
        out = event => Raced::Event(out),
        _ = tokio::time::sleep(timeout) => Raced::TimedOut,
    }
}

/// Calls `probe` up to `attempts` times, sleeping `delay` between calls, and
/// returns the first `Some`. A probe error ends the search immediately.
pub async fn retry_find<T, E, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut probe: F,
) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 1..=attempts {
        if let Some(found) = probe(attempt).await? {
            return Ok(Some(found));
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(None)
}
