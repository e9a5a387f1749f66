//! Consumer-side query handle.
//!
//! A [`Query`] tracks the last key it settled on so that, under
//! `keep_previous_data`, switching to a new key keeps the old data on
//! screen while the new fetch is pending instead of flashing an empty
//! state.

use super::cache::{QueryCache, QueryError, QueryOptions, QuerySnapshot, QueryStatus};
use super::key::QueryKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

/// One consumer's view of a (possibly changing) logical query.
pub struct Query<T> {
    cache: QueryCache,
    options: QueryOptions,
    last: Option<(QueryKey, T)>,
}

impl<T> Query<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(cache: QueryCache, options: QueryOptions) -> Self {
        Self {
            cache,
            options,
            last: None,
        }
    }

    /// Resolve the query for `key`, awaiting a settled result.
    pub async fn fetch<F, Fut>(&mut self, key: QueryKey, fetch: F) -> QuerySnapshot<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let snapshot = self
            .cache
            .query(key.clone(), self.options.clone(), fetch)
            .await;
        self.remember(&key, &snapshot);
        snapshot
    }

    /// Force a fresh fetch for `key`, awaiting the result.
    pub async fn refetch<F, Fut>(&mut self, key: QueryKey, fetch: F) -> QuerySnapshot<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let snapshot = self.cache.refetch(key.clone(), fetch).await;
        self.remember(&key, &snapshot);
        snapshot
    }

    /// Non-blocking read: starts or joins a fetch as needed and returns the
    /// current state. While a new key's fetch is pending and
    /// `keep_previous_data` is set, the previously settled data is served,
    /// flagged `is_previous`.
    pub fn poll<F, Fut>(&mut self, key: QueryKey, fetch: F) -> QuerySnapshot<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let mut snapshot = self
            .cache
            .poll_query(key.clone(), self.options.clone(), fetch);

        if snapshot.status == QueryStatus::Success {
            self.remember(&key, &snapshot);
        } else if snapshot.data.is_none() && self.options.keep_previous_data {
            if let Some((last_key, last_data)) = &self.last {
                if *last_key != key {
                    snapshot.data = Some(last_data.clone());
                    snapshot.is_previous = true;
                }
            }
        }

        snapshot
    }

    fn remember(&mut self, key: &QueryKey, snapshot: &QuerySnapshot<T>) {
        if snapshot.status == QueryStatus::Success {
            if let Some(data) = &snapshot.data {
                self.last = Some((key.clone(), data.clone()));
            }
        }
    }
}
