//! Batches of store operations that are committed as one transaction when
//! possible, and split into smaller transactions when the store refuses them
//! as too large.

use std::ops::Range;

use thiserror::Error;
use tracing::{Level, debug, trace, warn};

use crate::config::{ResultCountPolicy, StorageConfig};
use crate::error::{ConfigResult, LocalStorageError, StorageResult};
use crate::operation::{OperationBuilder, OperationRequest, OperationResult};
use crate::profile::BackendProfile;
use crate::store::{StoreClient, StoreError};

/// A commit that failed after applying `applied` (possibly nothing).
///
/// Splitting gives up atomicity, so the operations in `applied` are durable
/// in the store even though the commit as a whole failed. The batch queue is
/// empty afterwards; [`BatchOperation::restore`] puts the operations that
/// were not applied back on the queue.
#[derive(Error, Debug)]
#[error("Couldn't commit batch ({} of {} operation(s) applied)", .applied.len(), .operations.len())]
pub struct CommitError {
    #[source]
    error: LocalStorageError,
    applied: Range<usize>,
    operations: Vec<OperationBuilder>,
    results: Vec<Option<OperationResult>>,
}

impl CommitError {
    pub fn error(&self) -> &LocalStorageError {
        &self.error
    }

    /// Original indices of the operations that were applied before the failure.
    pub fn applied(&self) -> Range<usize> {
        self.applied.clone()
    }

    /// Whether some operations were applied before the failure.
    pub fn is_partial(&self) -> bool {
        !self.applied.is_empty()
    }

    /// All operations of the failed commit, in their original order.
    pub fn operations(&self) -> &[OperationBuilder] {
        &self.operations
    }

    pub fn into_error(self) -> LocalStorageError {
        self.error
    }

    /// The operations that were not applied, ready to be enqueued at queue
    /// position `base`.
    ///
    /// References to applied operations become the ids of the created rows;
    /// the others are moved along with the operations they point to.
    pub fn into_unapplied(self, base: usize) -> StorageResult<Vec<OperationBuilder>> {
        let applied_end = self.applied.end;
        let results = self.results;

        self.operations
            .into_iter()
            .enumerate()
            .skip(applied_end)
            .map(|(index, op)| rebase(op, index, applied_end, base, &results))
            .collect()
    }
}

/// State of one commit: the queue snapshot and the results collected so far.
struct BatchState {
    operations: Vec<OperationBuilder>,
    results: Vec<Option<OperationResult>>,
    /// Sub-batches run left to right, so applied operations form a prefix.
    applied_end: usize,
}

impl BatchState {
    fn new(operations: Vec<OperationBuilder>) -> Self {
        let results = vec![None; operations.len()];
        BatchState {
            operations,
            results,
            applied_end: 0,
        }
    }

    fn requests(
        &self,
        start: usize,
        end: usize,
        profile: BackendProfile,
    ) -> StorageResult<Vec<OperationRequest>> {
        self.operations[start..end]
            .iter()
            .enumerate()
            .map(|(i, op)| {
                finalize(op, start + i, start, &self.results, profile.is_yield_point(i + 1))
            })
            .collect()
    }

    fn store_results(&mut self, start: usize, end: usize, results: Vec<OperationResult>) {
        for (slot, result) in self.results[start..end].iter_mut().zip(results) {
            *slot = Some(result);
        }
    }
}

/// Id of the row created by operation `referenced`, which operation `index`
/// needs for `key`.
fn referenced_id(
    results: &[Option<OperationResult>],
    index: usize,
    key: &str,
    referenced: usize,
) -> StorageResult<i64> {
    results
        .get(referenced)
        .and_then(Option::as_ref)
        .and_then(OperationResult::id)
        .ok_or_else(|| LocalStorageError::MissingReferenceResult {
            index,
            key: key.to_string(),
            referenced,
        })
}

/// Finalizes the operation at queue position `index` for a sub-batch starting
/// at `start`.
///
/// Back references to operations before `start` have already been applied in
/// an earlier sub-batch; they are replaced by the id of the created row.
/// References into the sub-batch are shifted to positions within it.
fn finalize(
    op: &OperationBuilder,
    index: usize,
    start: usize,
    results: &[Option<OperationResult>],
    yield_point: bool,
) -> StorageResult<OperationRequest> {
    let mut request = op.build();
    request.value_back_references.clear();

    for (key, backref) in op.value_back_references() {
        let referenced = backref.original_index;
        if referenced < start {
            request.values.put(key, referenced_id(results, index, key, referenced)?);
        } else {
            request
                .value_back_references
                .insert(key.to_string(), backref.local_index(start));
        }
    }

    request.yield_allowed |= yield_point;
    Ok(request)
}

/// Moves the unapplied operation at `index` to queue position
/// `index - applied_end + base`.
fn rebase(
    mut op: OperationBuilder,
    index: usize,
    applied_end: usize,
    base: usize,
    results: &[Option<OperationResult>],
) -> StorageResult<OperationBuilder> {
    let references: Vec<(String, usize)> = op
        .value_back_references()
        .map(|(key, backref)| (key.to_string(), backref.original_index))
        .collect();

    for (key, referenced) in references {
        op = if referenced < applied_end {
            let id = referenced_id(results, index, &key, referenced)?;
            op.resolve_value_back_reference(&key, id)
        } else {
            op.with_value_back_reference(key, referenced - applied_end + base)
        };
    }
    Ok(op)
}

/// Queue of store operations that are committed together.
///
/// Use [`BatchOperation::calendar`], [`BatchOperation::contacts`] or
/// [`BatchOperation::tasks`] to get the right yield point limit for a store.
pub struct BatchOperation<S> {
    client: S,
    profile: BackendProfile,
    result_count: ResultCountPolicy,
    queue: Vec<OperationBuilder>,
    results: Vec<Option<OperationResult>>,
}

impl<S: StoreClient> BatchOperation<S> {
    pub fn new(client: S, profile: BackendProfile) -> Self {
        BatchOperation {
            client,
            profile,
            result_count: ResultCountPolicy::default(),
            queue: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn calendar(client: S) -> Self {
        Self::new(client, BackendProfile::CALENDAR)
    }

    pub fn contacts(client: S) -> Self {
        Self::new(client, BackendProfile::CONTACTS)
    }

    pub fn tasks(client: S) -> Self {
        Self::new(client, BackendProfile::TASKS)
    }

    /// Creates a batch for the named profile, honoring overrides and the
    /// result count policy from `config`.
    pub fn from_config(client: S, config: &StorageConfig, profile: &str) -> ConfigResult<Self> {
        Ok(Self::new(client, config.profile(profile)?).with_result_count_policy(config.result_count))
    }

    pub fn with_result_count_policy(mut self, policy: ResultCountPolicy) -> Self {
        self.result_count = policy;
        self
    }

    pub fn profile(&self) -> BackendProfile {
        self.profile
    }

    pub fn client(&self) -> &S {
        &self.client
    }

    pub fn into_client(self) -> S {
        self.client
    }

    /// Index the next enqueued operation will have, for use in back references.
    pub fn next_backref_idx(&self) -> usize {
        self.queue.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn enqueue(&mut self, operation: OperationBuilder) -> &mut Self {
        self.queue.push(operation);
        self
    }

    pub fn enqueue_all(&mut self, operations: impl IntoIterator<Item = OperationBuilder>) -> &mut Self {
        self.queue.extend(operations);
        self
    }

    /// Puts the operations of a failed commit that were not applied back at
    /// the end of the queue.
    ///
    /// Fails with [`LocalStorageError::MissingReferenceResult`] when one of
    /// them references an applied operation that didn't create a row; the
    /// queue is left unchanged then.
    pub fn restore(&mut self, err: CommitError) -> StorageResult<&mut Self> {
        let unapplied = err.into_unapplied(self.queue.len())?;
        debug!(restored = unapplied.len(), "Restoring unapplied operations");
        self.queue.extend(unapplied);
        Ok(self)
    }

    /// Result of the operation at `idx` of the last commit.
    pub fn result(&self, idx: usize) -> Option<&OperationResult> {
        self.results.get(idx).and_then(Option::as_ref)
    }

    /// Commits all queued operations and empties the queue.
    ///
    /// Returns the number of affected rows: the counts reported for updates
    /// and deletes plus one per insert.
    pub fn commit(&mut self) -> Result<u64, CommitError> {
        let operations = std::mem::take(&mut self.queue);
        self.results.clear();

        if operations.is_empty() {
            return Ok(0);
        }

        if tracing::enabled!(Level::TRACE) {
            for (idx, op) in operations.iter().enumerate() {
                trace!(idx, "{}", op.build());
            }
        }
        debug!(operations = operations.len(), "Committing batch");

        let total = operations.len();
        let mut state = BatchState::new(operations);
        let outcome = self.run_batch(&mut state, 0, total);

        let BatchState {
            operations,
            results,
            applied_end,
        } = state;

        match outcome {
            Ok(()) => {
                self.results = results;
                let affected: u64 = self
                    .results
                    .iter()
                    .flatten()
                    .map(OperationResult::affected)
                    .sum();
                debug!(affected, "Batch committed");
                Ok(affected)
            }
            Err(error) => {
                self.results = results.clone();
                Err(CommitError {
                    error,
                    applied: 0..applied_end,
                    operations,
                    results,
                })
            }
        }
    }

    /// Runs operations `start..end` of `state` in one transaction, splitting
    /// the range in halves as long as the store refuses it as too large.
    fn run_batch(&mut self, state: &mut BatchState, start: usize, end: usize) -> StorageResult<()> {
        if end == start {
            return Ok(());
        }

        let requests = state.requests(start, end, self.profile)?;
        debug!(start, end, "Running sub-batch");

        match self.client.apply_batch(&requests) {
            Ok(results) => {
                let expected = end - start;
                let actual = results.len();
                state.store_results(start, end, results);
                state.applied_end = end;

                if actual != expected {
                    match self.result_count {
                        ResultCountPolicy::Warn => warn!(
                            start,
                            end,
                            expected,
                            actual,
                            "Batch operation returned an unexpected number of results"
                        ),
                        ResultCountPolicy::Strict => {
                            return Err(LocalStorageError::ResultCountMismatch {
                                start,
                                end,
                                expected,
                                actual,
                            });
                        }
                    }
                }
                Ok(())
            }

            Err(StoreError::TooLarge) => {
                if end - start <= 1 {
                    return Err(LocalStorageError::TooLargeUnsplittable {
                        index: start,
                        source: StoreError::TooLarge,
                    });
                }

                warn!(start, end, "Transaction too large, splitting (losing atomicity)");
                let mid = start + (end - start) / 2;

                self.run_batch(state, start, mid)?;
                self.run_batch(state, mid, end)
            }

            Err(e) => Err(LocalStorageError::from_store(start, end, e)),
        }
    }
}

impl<S: StoreClient> Extend<OperationBuilder> for BatchOperation<S> {
    fn extend<I: IntoIterator<Item = OperationBuilder>>(&mut self, iter: I) {
        self.queue.extend(iter);
    }
}
