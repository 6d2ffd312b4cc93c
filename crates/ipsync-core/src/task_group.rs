//! Bounded task group
//!
//! Runs a phase's calls with at most `concurrency` in flight and joins all of
//! them before returning, so the next phase never overlaps this one. Work is
//! driven on the caller's task; nothing is spawned, so nothing outlives the
//! phase.

use futures_util::stream::{self, StreamExt};
use std::future::Future;

#[derive(Debug, Clone, Copy)]
pub struct TaskGroup {
    concurrency: usize,
}

impl TaskGroup {
    /// Group running at most `concurrency` futures at once (minimum 1)
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `f` over every item and collect every outcome
    ///
    /// Outcomes are returned in input order once all work has finished.
    pub async fn run<I, F, Fut, T>(&self, items: I, f: F) -> Vec<T>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(items)
            .map(f)
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn preserves_input_order() {
        let group = TaskGroup::new(4);
        let out = tokio_test::block_on(group.run(vec![3u64, 1, 2], |n| async move { n * 10 }));
        assert_eq!(out, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let group = TaskGroup::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        group
            .run(0..20, |_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }
}
