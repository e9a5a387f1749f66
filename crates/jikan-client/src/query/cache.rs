//! Process-lifetime cache of logical query results.
//!
//! Entries are keyed by [`QueryKey`] and hold the JSON document a fetch
//! settled with, so one cache serves every payload type. A key has at most
//! one fetch in flight at a time: concurrent callers join the pending
//! outcome instead of dispatching their own. Fetches run on a spawned task,
//! so a caller that loses interest does not cancel the upstream call and
//! later callers still get the result.

use super::key::QueryKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Failure recorded in a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The fetch function itself failed.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// The stored payload could not be converted to or from JSON.
    #[error("payload did not match the requested type: {0}")]
    Decode(String),
}

/// Lifecycle state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

/// Per-query knobs, mirroring what consumers actually tune.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Age after which a settled entry is eligible for refetch.
    /// `None` means entries stay fresh for the lifetime of the process.
    pub stale_time: Option<Duration>,
    /// Disabled queries never execute and report pending.
    pub enabled: bool,
    /// On a key change, keep showing the previous key's data while the new
    /// fetch is pending (observer-side, see [`super::observer::Query`]).
    pub keep_previous_data: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: None,
            enabled: true,
            keep_previous_data: false,
        }
    }
}

/// Read-only view of a cache entry.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
    pub data: Option<T>,
    pub error: Option<QueryError>,
    pub status: QueryStatus,
    /// A fetch for this key is currently in flight.
    pub is_fetching: bool,
    /// `data` belongs to a previously observed key (keep-previous-data).
    pub is_previous: bool,
    pub fetched_at: Option<Instant>,
}

impl<T> QuerySnapshot<T> {
    fn pending(is_fetching: bool) -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Pending,
            is_fetching,
            is_previous: false,
            fetched_at: None,
        }
    }
}

type StoredResult = Result<serde_json::Value, QueryError>;

#[derive(Debug, Clone)]
struct Settled {
    result: StoredResult,
    fetched_at: Instant,
}

impl Settled {
    /// Error entries are always eligible for refetch.
    fn is_fresh(&self, stale_time: Option<Duration>) -> bool {
        self.result.is_ok() && stale_time.map_or(true, |limit| self.fetched_at.elapsed() < limit)
    }
}

#[derive(Default)]
struct Slot {
    settled: Option<Settled>,
    inflight: Option<watch::Receiver<bool>>,
}

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<QueryKey, Slot>>,
}

/// Shared handle to the query cache. Clones see the same entries.
#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

/// Entry counts for logging.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a logical query, awaiting a settled result.
    ///
    /// A fresh cached entry is served without invoking `fetch`; an in-flight
    /// fetch for the same key is joined; otherwise `fetch` runs once on a
    /// spawned task and every waiter sees its outcome.
    pub async fn query<T, F, Fut>(
        &self,
        key: QueryKey,
        options: QueryOptions,
        fetch: F,
    ) -> QuerySnapshot<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        if !options.enabled {
            debug!(key = %key, "Query disabled, skipping fetch");
            return QuerySnapshot::pending(false);
        }
        self.resolve(key, options.stale_time, false, fetch).await
    }

    /// Force a new fetch for the key, bypassing freshness. Still joins an
    /// already in-flight fetch rather than stacking a second one.
    pub async fn refetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> QuerySnapshot<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        self.resolve(key, None, true, fetch).await
    }

    /// Non-blocking variant of [`QueryCache::query`]: starts or joins a
    /// fetch as needed and returns the entry's current state immediately.
    /// A stale entry keeps serving its data while the refresh runs.
    pub fn poll_query<T, F, Fut>(
        &self,
        key: QueryKey,
        options: QueryOptions,
        fetch: F,
    ) -> QuerySnapshot<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        if !options.enabled {
            return QuerySnapshot::pending(false);
        }

        {
            let mut slots = self.inner.slots.lock().unwrap();
            let slot = slots.entry(key.clone()).or_default();
            let fresh = slot
                .settled
                .as_ref()
                .is_some_and(|settled| settled.is_fresh(options.stale_time));
            if slot.inflight.is_none() && !fresh {
                self.start_fetch_locked(slot, &key, fetch);
            }
        }

        self.snapshot_of(&key)
    }

    /// Current state of a key without triggering anything.
    pub fn peek<T: DeserializeOwned>(&self, key: &QueryKey) -> QuerySnapshot<T> {
        self.snapshot_of(key)
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.inner.slots.lock().unwrap();
        CacheStats {
            entries: slots.len(),
            in_flight: slots.values().filter(|slot| slot.inflight.is_some()).count(),
        }
    }

    async fn resolve<T, F, Fut>(
        &self,
        key: QueryKey,
        stale_time: Option<Duration>,
        force: bool,
        fetch: F,
    ) -> QuerySnapshot<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let waiter = {
            let mut slots = self.inner.slots.lock().unwrap();
            let slot = slots.entry(key.clone()).or_default();

            if let Some(rx) = &slot.inflight {
                debug!(key = %key, "Joining in-flight fetch");
                Some(rx.clone())
            } else if !force
                && slot
                    .settled
                    .as_ref()
                    .is_some_and(|settled| settled.is_fresh(stale_time))
            {
                debug!(key = %key, "Serving cached entry");
                None
            } else {
                Some(self.start_fetch_locked(slot, &key, fetch))
            }
        };

        if let Some(mut rx) = waiter {
            // Settles to true once the fetch task has stored its result. A
            // closed channel means the task died; fall through and report
            // whatever state the slot is in.
            if !*rx.borrow() {
                while rx.changed().await.is_ok() {
                    if *rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.snapshot_of(&key)
    }

    /// Install an in-flight marker and spawn the fetch. Called with the
    /// slot map locked; the returned receiver settles when the result is in.
    fn start_fetch_locked<T, F, Fut>(
        &self,
        slot: &mut Slot,
        key: &QueryKey,
        fetch: F,
    ) -> watch::Receiver<bool>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(false);
        slot.inflight = Some(rx.clone());

        debug!(key = %key, "Starting fetch");
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        let future = fetch();
        tokio::spawn(async move {
            let result = future.await.and_then(|value| {
                serde_json::to_value(&value).map_err(|e| QueryError::Decode(e.to_string()))
            });

            if let Err(error) = &result {
                warn!(key = %key, error = %error, "Query settled with error");
            }

            {
                let mut slots = inner.slots.lock().unwrap();
                let slot = slots.entry(key).or_default();
                slot.settled = Some(Settled {
                    result,
                    fetched_at: Instant::now(),
                });
                slot.inflight = None;
            }

            let _ = tx.send(true);
        });

        rx
    }

    fn snapshot_of<T: DeserializeOwned>(&self, key: &QueryKey) -> QuerySnapshot<T> {
        let slots = self.inner.slots.lock().unwrap();
        let Some(slot) = slots.get(key) else {
            return QuerySnapshot::pending(false);
        };

        let is_fetching = slot.inflight.is_some();
        let Some(settled) = &slot.settled else {
            return QuerySnapshot::pending(is_fetching);
        };

        match &settled.result {
            Ok(value) => match serde_json::from_value::<T>(value.clone()) {
                Ok(data) => QuerySnapshot {
                    data: Some(data),
                    error: None,
                    status: QueryStatus::Success,
                    is_fetching,
                    is_previous: false,
                    fetched_at: Some(settled.fetched_at),
                },
                Err(e) => QuerySnapshot {
                    data: None,
                    error: Some(QueryError::Decode(e.to_string())),
                    status: QueryStatus::Error,
                    is_fetching,
                    is_previous: false,
                    fetched_at: Some(settled.fetched_at),
                },
            },
            Err(error) => QuerySnapshot {
                data: None,
                error: Some(error.clone()),
                status: QueryStatus::Error,
                is_fetching,
                is_previous: false,
                fetched_at: Some(settled.fetched_at),
            },
        }
    }
}
