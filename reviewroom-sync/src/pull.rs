//! Pull-based REST fallback.
//!
//! Used when the push channel is unavailable or slow. Fetches race a
//! fixed timeout; failures degrade to a usable-stale cache entry when one
//! exists and otherwise retry with linear backoff. Cancellation is by
//! dropping the future (the coordinator aborts the task that polls it),
//! so cancelled attempts are never retried.

use crate::cache::CacheStore;
use crate::config::SyncConfig;
use crate::transport::RestTransport;
use reviewroom_api::types::{MarkSubmission, ReviewsQuery};
use reviewroom_core::{DataSource, FilterSet, ReviewSnapshot, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A resolved snapshot tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub snapshot: ReviewSnapshot,
    pub source: DataSource,
}

pub struct PullFallback {
    rest: Arc<dyn RestTransport>,
    cache: Arc<CacheStore>,
    request_timeout: Duration,
    retry_delay: Duration,
    max_retries: u32,
}

impl PullFallback {
    pub fn new(rest: Arc<dyn RestTransport>, cache: Arc<CacheStore>, config: &SyncConfig) -> Self {
        Self {
            rest,
            cache,
            request_timeout: config.request_timeout,
            retry_delay: config.retry_delay,
            max_retries: config.max_retries,
        }
    }

    /// Resolve a snapshot for the filter scope.
    ///
    /// A fresh cache entry short-circuits the network entirely. On
    /// success the result is written back to the cache; the caller routes
    /// it through the coalescer as a full snapshot so merge invariants
    /// stay uniform.
    pub async fn fetch(&self, filters: &FilterSet) -> Result<FetchResult, SyncError> {
        let key = filters.cache_key();
        if let Some(entry) = self.cache.get(&key) {
            if self.cache.is_fresh(&entry) {
                debug!(key = %key, "serving fresh cache entry, no network call");
                return Ok(FetchResult {
                    snapshot: entry.payload,
                    source: DataSource::Cache,
                });
            }
        }

        let query = ReviewsQuery::from(filters);
        let mut attempt: u32 = 1;
        loop {
            let outcome =
                tokio::time::timeout(self.request_timeout, self.rest.fetch_reviews(&query)).await;
            let err = match outcome {
                Ok(Ok(snapshot)) => {
                    self.cache.put(key, snapshot.clone());
                    return Ok(FetchResult {
                        snapshot,
                        source: DataSource::Api,
                    });
                }
                Ok(Err(err)) => err,
                Err(_elapsed) => SyncError::RequestTimeout {
                    timeout_ms: self.request_timeout.as_millis() as u64,
                },
            };

            warn!(key = %key, attempt, error = %err, "pull fetch attempt failed");

            // A stale-but-usable entry beats hammering a failing backend.
            if let Some(entry) = self.cache.get(&key) {
                if self.cache.is_usable_stale(&entry) {
                    debug!(key = %key, "degrading to stale cache entry");
                    return Ok(FetchResult {
                        snapshot: entry.payload,
                        source: DataSource::Cache,
                    });
                }
            }

            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(self.retry_delay * attempt).await;
            attempt += 1;
        }
    }

    /// Submit marks over REST. Used when the push channel is down; the
    /// caller follows up with a refetch since no broadcast will arrive.
    pub async fn submit(&self, submission: &MarkSubmission) -> Result<(), SyncError> {
        self.rest.submit_marks(submission).await
    }
}
