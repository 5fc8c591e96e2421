//! Per-key request deduplication.
//!
//! The first caller for a key runs the work; callers arriving while it is in
//! flight wait for and share its result. If the leading caller is dropped
//! before finishing, waiters race to lead a new attempt.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Notify, OnceCell};

struct Flight<T> {
    /// `None` means the leader was dropped without a result.
    result: OnceCell<Option<T>>,
    notify: Notify,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn finish(&self, result: Option<T>) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> Option<T> {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

/// Removes the flight and wakes waiters even if the leader is cancelled.
struct LeaderGuard<'a, T: Clone> {
    owner: &'a SingleFlight<T>,
    key: &'a str,
    flight: Arc<Flight<T>>,
    result: Option<T>,
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        self.owner
            .in_flight
            .remove_if(self.key, |_, current| Arc::ptr_eq(current, &self.flight));
        self.flight.finish(self.result.take());
    }
}

pub(crate) struct SingleFlight<T> {
    in_flight: DashMap<String, Arc<Flight<T>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Join the flight for `key`, creating it if absent. Returns whether the caller leads.
    fn join(&self, key: &str) -> (Arc<Flight<T>>, bool) {
        if let Some(existing) = self.in_flight.get(key) {
            return (existing.clone(), false);
        }

        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let flight = Arc::new(Flight::new());
                entry.insert(flight.clone());
                (flight, true)
            }
        }
    }

    /// Run `work` for `key` unless a run is already in flight, in which case
    /// its result is shared.
    pub(crate) async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let flight = loop {
            let (flight, leader) = self.join(key);
            if leader {
                break flight;
            }
            if let Some(result) = flight.wait().await {
                return result;
            }
        };

        let mut guard = LeaderGuard {
            owner: self,
            key,
            flight,
            result: None,
        };
        let result = work().await;
        guard.result = Some(result.clone());
        result
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flights = SingleFlight::new();
        let runs = AtomicUsize::new(0);
        let runs = &runs;

        let work = move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            42
        };

        let (a, b, c) = tokio::join!(
            flights.run("k", work),
            flights.run("k", work),
            flights.run("k", work)
        );

        assert_eq!((a, b, c), (42, 42, 42));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights = SingleFlight::new();
        let (a, b) = tokio::join!(
            flights.run("a", || async { 1 }),
            flights.run("b", || async { 2 })
        );
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn test_waiter_takes_over_when_leader_is_dropped() {
        let flights = Arc::new(SingleFlight::new());

        let leader_flights = flights.clone();
        let leader = tokio::spawn(async move {
            leader_flights
                .run("k", || async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    1
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter_flights = flights.clone();
        let waiter =
            tokio::spawn(async move { waiter_flights.run("k", || async { 2 }).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, 2);
    }
}
