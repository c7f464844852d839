//! Transcript part retrieval from an object store.

use super::{render_part, SkippedPart, TranscriptPart};
use crate::chunk::TranscriptLocation;
use crate::config::ObjectStoreSettings;
use crate::error::{Result, WarechatError};
use crate::object_store::{ObjectEntry, ObjectStore, ObjectStoreError, StoreResult};
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying transient failures and per-attempt timeouts.
    pub async fn run<T, F, Fut>(&self, what: &str, timeout: Duration, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                debug!("Retrying {} in {:?} (attempt {}/{})", what, delay, attempt + 1, attempts);
                tokio::time::sleep(delay).await;
            }

            let outcome = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ObjectStoreError::Transient(format!(
                    "{} timed out after {:?}",
                    what, timeout
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!("Transient failure on {}: {}", what, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ObjectStoreError::Transient(format!("{} failed after retries", what))
        }))
    }
}

/// Decides which listed objects are transcript parts and how they order.
#[derive(Debug, Clone)]
pub struct PartSelector {
    suffix: String,
    ordering: Regex,
}

impl PartSelector {
    /// `pattern` must contain one capture group matching the sequence number.
    pub fn new(suffix: &str, pattern: &str) -> Result<Self> {
        let ordering = Regex::new(pattern)
            .map_err(|e| WarechatError::Config(format!("invalid ordering pattern: {}", e)))?;
        if ordering.captures_len() < 2 {
            return Err(WarechatError::Config(format!(
                "ordering pattern '{}' needs a capture group",
                pattern
            )));
        }
        Ok(Self {
            suffix: suffix.to_string(),
            ordering,
        })
    }

    /// A part carries the suffix and an ordering key; other objects in the
    /// folder (manifests, summaries) are ignored.
    pub fn is_part(&self, name: &str) -> bool {
        name.ends_with(&self.suffix) && self.ordering_key(name).is_some()
    }

    /// Ordering key encoded in an object name, if any.
    pub fn ordering_key(&self, name: &str) -> Option<u64> {
        self.ordering
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

impl Default for PartSelector {
    fn default() -> Self {
        Self {
            suffix: ".json".to_string(),
            ordering: Regex::new(r"chunk_start-(\d+)").expect("static pattern"),
        }
    }
}

/// Outcome of fetching one chunk's parts.
#[derive(Debug, Clone, Default)]
pub struct FetchedParts {
    /// Retrieved parts, in listing order.
    pub parts: Vec<TranscriptPart>,
    pub skipped: Vec<SkippedPart>,
}

/// Lists and downloads transcript parts.
pub struct TranscriptFetcher {
    store: Arc<dyn ObjectStore>,
    selector: PartSelector,
    retry: RetryPolicy,
    timeout: Duration,
    max_concurrent: usize,
}

impl TranscriptFetcher {
    /// Create a fetcher with default policies.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            selector: PartSelector::default(),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            max_concurrent: 4,
        }
    }

    /// Create a fetcher configured from settings.
    pub fn from_settings(store: Arc<dyn ObjectStore>, settings: &ObjectStoreSettings) -> Result<Self> {
        Ok(Self::new(store)
            .with_selector(PartSelector::new(&settings.part_suffix, &settings.ordering_pattern)?)
            .with_retry(RetryPolicy {
                max_attempts: settings.max_attempts,
                base_delay: Duration::from_millis(settings.base_delay_ms),
                max_delay: Duration::from_millis(settings.max_delay_ms),
            })
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_max_concurrent(settings.max_concurrent_fetches))
    }

    pub fn with_selector(mut self, selector: PartSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Fetch every part under `location`.
    ///
    /// An empty listing yields no parts. Parts that fail individually are
    /// skipped and recorded; if every listed part fails the fetch fails with
    /// `TranscriptMergeFailure`.
    #[instrument(skip(self, location), fields(location = %location))]
    pub async fn fetch_parts(&self, location: &TranscriptLocation) -> Result<FetchedParts> {
        let listing = self
            .retry
            .run("transcript listing", self.timeout, || {
                self.store.list(&location.container, &location.prefix)
            })
            .await
            .map_err(|e| {
                WarechatError::TranscriptStoreUnavailable(format!("listing {}: {}", location, e))
            })?;

        let candidates: Vec<(usize, ObjectEntry)> = listing
            .into_iter()
            .filter(|entry| self.selector.is_part(&entry.name))
            .enumerate()
            .collect();

        if candidates.is_empty() {
            info!("No transcript parts under {}", location);
            return Ok(FetchedParts::default());
        }

        debug!("Fetching {} transcript parts", candidates.len());
        let listed = candidates.len();

        let mut results: Vec<(usize, std::result::Result<TranscriptPart, SkippedPart>)> =
            stream::iter(candidates)
                .map(|(listing_index, entry)| async move {
                    let outcome = self.fetch_one(&location.container, &entry.name, listing_index).await;
                    (listing_index, outcome)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        results.sort_by_key(|(idx, _)| *idx);

        let mut fetched = FetchedParts::default();
        for (_, outcome) in results {
            match outcome {
                Ok(part) => fetched.parts.push(part),
                Err(skipped) => {
                    warn!("Skipping transcript part {}: {}", skipped.name, skipped.reason);
                    fetched.skipped.push(skipped);
                }
            }
        }

        if fetched.parts.is_empty() {
            return Err(WarechatError::TranscriptMergeFailure(format!(
                "all {} transcript parts under {} failed (first: {})",
                listed,
                location,
                fetched
                    .skipped
                    .first()
                    .map(|s| format!("{}: {}", s.name, s.reason))
                    .unwrap_or_default()
            )));
        }

        info!(
            "Fetched {} of {} transcript parts",
            fetched.parts.len(),
            listed
        );
        Ok(fetched)
    }

    async fn fetch_one(
        &self,
        container: &str,
        name: &str,
        listing_index: usize,
    ) -> std::result::Result<TranscriptPart, SkippedPart> {
        let skip = |reason: String| SkippedPart {
            name: name.to_string(),
            reason,
        };

        let bytes = self
            .retry
            .run(name, self.timeout, || self.store.get(container, name))
            .await
            .map_err(|e| skip(e.to_string()))?;

        let text = render_part(&bytes).map_err(|e| skip(e.to_string()))?;

        Ok(TranscriptPart {
            name: name.to_string(),
            ordering_key: self.selector.ordering_key(name),
            listing_index,
            text,
        })
    }
}
