//! Concurrent multi-source search.
//!
//! The [`Runner`] spawns one task per source and admits them through a
//! source semaphore. Enrichment fetches inside each source go through a
//! second semaphore of the same size, so source tasks holding permits can
//! never starve their own detail fetches.
//!
//! A failing or panicking source never aborts the search: its outcome
//! carries the error and an empty record list.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::extract::Record;
use crate::source::{SearchQuery, Source, SourceAttributes, SourceError};

/// Default number of concurrently running sources.
pub const DEFAULT_THREADS: usize = 10;

/// Result of querying one source.
#[derive(Debug)]
pub struct SourceOutcome {
    /// Source id (slugified name).
    pub source_id: String,
    /// Source display name.
    pub source_name: String,
    /// Declaration position in the descriptor file.
    pub rank: usize,
    /// Presentation attributes, copied from the source.
    pub attributes: SourceAttributes,
    /// Extracted records; empty when `error` is set.
    pub records: Vec<Record>,
    /// Why the source produced nothing.
    pub error: Option<SourceError>,
}

impl SourceOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot passed to the progress callback after each source completes.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub source_name: &'a str,
    pub records: usize,
}

/// Runs sources concurrently with bounded parallelism.
#[derive(Debug, Clone)]
pub struct Runner {
    source_permits: Arc<Semaphore>,
    fetch_permits: Arc<Semaphore>,
    threads: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(DEFAULT_THREADS)
    }
}

impl Runner {
    /// A runner admitting `threads` sources and `threads` detail fetches at
    /// once. Zero is treated as one.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            source_permits: Arc::new(Semaphore::new(threads)),
            fetch_permits: Arc::new(Semaphore::new(threads)),
            threads,
        }
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queries every source and returns outcomes in completion order.
    ///
    /// `on_progress` fires once per finished source, from the calling task.
    #[instrument(skip_all, fields(sources = sources.len(), kind = %query.kind()))]
    pub async fn run<F>(
        &self,
        sources: &[Arc<Source>],
        query: &SearchQuery,
        mut on_progress: F,
    ) -> Vec<SourceOutcome>
    where
        F: FnMut(Progress<'_>),
    {
        let total = sources.len();
        let mut tasks = JoinSet::new();

        for (rank, source) in sources.iter().enumerate() {
            let source = Arc::clone(source);
            let query = query.clone();
            let source_permits = Arc::clone(&self.source_permits);
            let fetch_permits = Arc::clone(&self.fetch_permits);
            tasks.spawn(async move {
                let _permit = source_permits.acquire_owned().await.ok();
                debug!(source = %source.name(), rank, "source task started");
                let result = AssertUnwindSafe(source.query(&query, &fetch_permits))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(SourceError::Panicked {
                            source_name: source.name().to_string(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                outcome(&source, rank, result)
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    on_progress(Progress {
                        completed: outcomes.len() + 1,
                        total,
                        source_name: &outcome.source_name,
                        records: outcome.records.len(),
                    });
                    outcomes.push(outcome);
                }
                Err(e) => warn!(error = %e, "source task did not complete"),
            }
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        let records: usize = outcomes.iter().map(|o| o.records.len()).sum();
        info!(total, failed, records, "all sources finished");
        outcomes
    }
}

fn outcome(source: &Source, rank: usize, result: Result<Vec<Record>, SourceError>) -> SourceOutcome {
    let (records, error) = match result {
        Ok(records) => (records, None),
        Err(e) => {
            warn!(source = %source.name(), error = %e, "source failed");
            (Vec::new(), Some(e))
        }
    };
    SourceOutcome {
        source_id: source.id().to_string(),
        source_name: source.name().to_string(),
        rank,
        attributes: source.attributes().clone(),
        records,
        error,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
