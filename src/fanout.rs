//! Fan-out executor for multi-language operations.
//!
//! [`run_all`] runs one task per connection and collects every outcome keyed
//! by language. A failing or panicking task only affects its own language.
//! [`flatten`] turns the keyed batch into one list in a stable order.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult, LanguageFailure};
use crate::language::LanguageId;
use crate::pool::Connection;

/// Per-language outcomes of one fan-out.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub results: BTreeMap<LanguageId, T>,
    pub failures: Vec<LanguageFailure>,
    /// The caller cancelled before every task finished.
    pub cancelled: bool,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }
}

impl<T> BatchResult<T> {
    /// Adds failures that happened before the fan-out, e.g. connection acquisition.
    pub fn merge_failures(&mut self, failures: impl IntoIterator<Item = LanguageFailure>) {
        self.failures.extend(failures);
    }

    /// `PartialBatchFailure` when results and failures coexist.
    pub fn partial_failure(&self) -> Option<BridgeError> {
        if self.results.is_empty() || self.failures.is_empty() {
            return None;
        }
        Some(BridgeError::PartialBatchFailure {
            succeeded: self.results.keys().cloned().collect(),
            failed: self.failures.clone(),
        })
    }
}

/// A batch flattened into one list.
#[derive(Debug)]
pub struct Flattened<T> {
    /// Values of every language, ascending by language, each language's own
    /// order preserved.
    pub values: Vec<T>,
    /// Languages that produced a result.
    pub searched: Vec<LanguageId>,
    /// Failures sorted by language.
    pub failures: Vec<LanguageFailure>,
    pub cancelled: bool,
}

/// Runs `op` once per connection, concurrently.
///
/// Waits for every task unless `cancel` fires first; then the remaining tasks
/// are aborted and each unfinished language gets a `Cancelled` failure.
pub async fn run_all<T, F, Fut>(
    connections: Vec<Arc<Connection>>,
    cancel: &CancellationToken,
    op: F,
) -> BatchResult<T>
where
    T: Send + 'static,
    F: Fn(Arc<Connection>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BridgeResult<T>> + Send + 'static,
{
    let op = Arc::new(op);
    let mut tasks = JoinSet::new();
    let mut pending: HashMap<tokio::task::Id, LanguageId> = HashMap::new();

    for connection in connections {
        let language = connection.language().clone();
        let op = Arc::clone(&op);
        let token = cancel.child_token();
        let handle = tasks.spawn(async move { op(connection, token).await });
        pending.insert(handle.id(), language);
    }

    let mut batch = BatchResult::default();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            joined = tasks.join_next_with_id() => Some(joined),
        };

        let Some(next) = next else {
            tasks.abort_all();
            batch.cancelled = true;
            break;
        };
        let Some(joined) = next else {
            break;
        };
        match joined {
            Ok((id, result)) => {
                let Some(language) = pending.remove(&id) else {
                    continue;
                };
                match result {
                    Ok(value) => {
                        batch.results.insert(language, value);
                    }
                    Err(error) => {
                        debug!(language = %language, error = %error, "fan-out task failed");
                        batch.failures.push(LanguageFailure::new(language, error));
                    }
                }
            }
            Err(join_error) => {
                let Some(language) = pending.remove(&join_error.id()) else {
                    continue;
                };
                warn!(language = %language, error = %join_error, "fan-out task panicked");
                let error = BridgeError::RequestFailed {
                    language: language.clone(),
                    reason: format!("task failed: {join_error}"),
                };
                batch.failures.push(LanguageFailure::new(language, error));
            }
        }
    }

    if batch.cancelled {
        let mut unfinished: Vec<_> = pending.into_values().collect();
        unfinished.sort();
        batch.failures.extend(
            unfinished
                .into_iter()
                .map(|language| LanguageFailure::new(language, BridgeError::Cancelled)),
        );
    }
    batch
}

/// Concatenates per-language lists in ascending language order.
pub fn flatten<T>(batch: BatchResult<Vec<T>>) -> Flattened<T> {
    let BatchResult {
        results,
        mut failures,
        cancelled,
    } = batch;

    let searched = results.keys().cloned().collect();
    let values = results.into_values().flatten().collect();
    failures.sort_by(|a, b| a.language.cmp(&b.language));

    Flattened {
        values,
        searched,
        failures,
        cancelled,
    }
}
