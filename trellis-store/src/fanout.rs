//! Structured fan-out/fan-in joins.
//!
//! One lifecycle event triggers several independent storage writes; these
//! helpers run them concurrently and join on completion. [`all`] is the
//! engine's default join: order-preserving, failing fast on the first
//! error, dropping (and thereby cancelling) whatever has not completed.
//! [`settled`] never fails and is for callers that tolerate individual
//! failures, such as observer notification.
//!
//! Joining completions does not make the writes atomic. A crash between
//! two writes of one fan-out leaves the derived views inconsistent with
//! no automatic repair; that weakness is part of the storage contract,
//! not something this module papers over.

use futures::future::{join_all, try_join_all};
use std::future::Future;

/// Runs all futures concurrently and collects their outputs in input
/// order. The first error aborts the join and is returned; remaining
/// futures are dropped. An empty input completes immediately.
pub async fn all<I, F, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    try_join_all(futures).await
}

/// Runs all futures concurrently and collects every outcome in input
/// order, errors included. Never fails as a whole.
pub async fn settled<I, F, T, E>(futures: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(futures).await
}
