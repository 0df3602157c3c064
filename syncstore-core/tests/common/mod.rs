//! In-memory store used by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use syncstore_core::{
    OperationKind, OperationRequest, OperationResult, StoreClient, StoreError, Value, Values,
};
use url::Url;

/// Operations allowed between yield points when the limit is enforced,
/// like the Android contacts provider.
pub const MAX_OPERATIONS_PER_YIELD_POINT: usize = 500;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn rows_uri() -> Url {
    Url::parse("content://fake/rows").unwrap()
}

/// Store that refuses batches larger than `capacity` as too large, and
/// applies everything else atomically to an in-memory table.
pub struct FakeStore {
    pub capacity: usize,
    pub enforce_yield_points: bool,
    /// Fail the next call with a runtime fault.
    pub fail_next: bool,
    /// Fail the n-th call (1-based) with a runtime fault.
    pub fail_call: Option<usize>,
    /// Every submitted batch, including refused ones.
    pub batches: Vec<Vec<OperationRequest>>,
    pub rows: BTreeMap<i64, Values>,
    next_id: i64,
}

impl FakeStore {
    pub fn new(capacity: usize) -> Self {
        FakeStore {
            capacity,
            enforce_yield_points: false,
            fail_next: false,
            fail_call: None,
            batches: Vec::new(),
            rows: BTreeMap::new(),
            next_id: 42,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    pub fn with_yield_points(mut self) -> Self {
        self.enforce_yield_points = true;
        self
    }

    fn check_yield_points(&self, operations: &[OperationRequest]) -> Result<(), StoreError> {
        let mut count = 0;
        for (i, op) in operations.iter().enumerate() {
            count += 1;
            if count >= MAX_OPERATIONS_PER_YIELD_POINT {
                return Err(StoreError::ApplyFailed(format!(
                    "Too many operations between yield points (at {i})"
                )));
            }
            if i > 0 && op.yield_allowed {
                count = 0;
            }
        }
        Ok(())
    }

    fn matching_ids(rows: &BTreeMap<i64, Values>, op: &OperationRequest) -> Vec<i64> {
        match &op.selection {
            Some(selection) if selection.clause == "_id=?" => selection
                .args
                .first()
                .and_then(|id| id.parse().ok())
                .filter(|id| rows.contains_key(id))
                .into_iter()
                .collect(),
            _ => rows.keys().copied().collect(),
        }
    }
}

impl StoreClient for FakeStore {
    fn apply_batch(
        &mut self,
        operations: &[OperationRequest],
    ) -> Result<Vec<OperationResult>, StoreError> {
        self.batches.push(operations.to_vec());

        if std::mem::take(&mut self.fail_next) || self.fail_call == Some(self.batches.len()) {
            return Err(StoreError::Fault("dead object".into()));
        }
        if operations.len() > self.capacity {
            return Err(StoreError::TooLarge);
        }
        if self.enforce_yield_points {
            self.check_yield_points(operations)?;
        }

        // work on a copy so that a rejected batch leaves no trace
        let mut rows = self.rows.clone();
        let mut next_id = self.next_id;
        let mut results: Vec<OperationResult> = Vec::with_capacity(operations.len());

        for (i, op) in operations.iter().enumerate() {
            let mut values = op.values.clone();
            for (key, &index) in &op.value_back_references {
                let id = results
                    .get(index)
                    .filter(|_| index < i)
                    .and_then(OperationResult::id)
                    .ok_or_else(|| {
                        StoreError::ApplyFailed(format!("invalid back reference {index} at {i}"))
                    })?;
                values.put(key.clone(), id);
            }

            let result = match op.kind {
                OperationKind::Insert => {
                    let id = next_id;
                    next_id += 1;
                    rows.insert(id, values);
                    let uri = Url::parse(&format!("{}/{id}", op.uri)).unwrap();
                    OperationResult::Uri(uri)
                }
                OperationKind::Update => {
                    let ids = Self::matching_ids(&rows, op);
                    for id in &ids {
                        if let Some(row) = rows.get_mut(id) {
                            row.merge(values.clone());
                        }
                    }
                    OperationResult::Count(ids.len() as u64)
                }
                OperationKind::Delete => {
                    let ids = Self::matching_ids(&rows, op);
                    for id in &ids {
                        rows.remove(id);
                    }
                    OperationResult::Count(ids.len() as u64)
                }
            };
            results.push(result);
        }

        self.rows = rows;
        self.next_id = next_id;
        Ok(results)
    }
}

pub fn value_of(row: &Values, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_integer)
}
