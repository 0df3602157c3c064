//! Store operations: the mutable builder callers enqueue, the immutable request
//! submitted to the store, and the per-operation result the store returns.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::InvalidOperationDescriptor;
use crate::values::{Value, Values};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// Reference to the row produced by another operation of the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackReference {
    /// Index of the referenced operation in the original, non-split batch.
    pub original_index: usize,
}

impl BackReference {
    pub fn new(original_index: usize) -> Self {
        BackReference { original_index }
    }

    /// Index to use within a sub-batch that starts at `start`.
    ///
    /// Only valid when the referenced operation is part of that sub-batch.
    pub fn local_index(&self, start: usize) -> usize {
        self.original_index - start
    }
}

/// `WHERE`-style selection with positional `?` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub clause: String,
    pub args: Vec<String>,
}

/// Builder for one pending store operation.
///
/// Unlike the finalized [`OperationRequest`], value back references can be
/// removed again, which the batch executor needs when it resolves them to
/// literal ids after a split.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationBuilder {
    kind: OperationKind,
    uri: Url,
    selection: Option<Selection>,
    values: Values,
    value_back_references: BTreeMap<String, BackReference>,
    yield_allowed: bool,
}

impl OperationBuilder {
    fn new(kind: OperationKind, uri: Url) -> Self {
        OperationBuilder {
            kind,
            uri,
            selection: None,
            values: Values::new(),
            value_back_references: BTreeMap::new(),
            yield_allowed: false,
        }
    }

    pub fn new_insert(uri: Url) -> Self {
        Self::new(OperationKind::Insert, uri)
    }

    pub fn new_update(uri: Url) -> Self {
        Self::new(OperationKind::Update, uri)
    }

    pub fn new_delete(uri: Url) -> Self {
        Self::new(OperationKind::Delete, uri)
    }

    /// Restricts the affected rows. Accepted for every kind; stores ignore
    /// it for inserts.
    pub fn with_selection<I, S>(mut self, clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(Selection {
            clause: clause.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.put(key, value);
        self
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values += values;
        self
    }

    /// Fills `key` with the id of the row created by the operation at
    /// `original_index` of the same batch.
    pub fn with_value_back_reference(mut self, key: impl Into<String>, original_index: usize) -> Self {
        self.value_back_references
            .insert(key.into(), BackReference::new(original_index));
        self
    }

    pub fn remove_value_back_reference(
        mut self,
        key: &str,
    ) -> Result<Self, InvalidOperationDescriptor> {
        if self.value_back_references.remove(key).is_none() {
            return Err(InvalidOperationDescriptor::NoBackReference(key.to_string()));
        }
        Ok(self)
    }

    /// Replaces the back reference under `key` by the literal `value`.
    pub(crate) fn resolve_value_back_reference(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.value_back_references.remove(key);
        self.values.put(key, value);
        self
    }

    pub fn with_yield_allowed(mut self) -> Self {
        self.yield_allowed = true;
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn value_back_references(&self) -> impl Iterator<Item = (&str, &BackReference)> {
        self.value_back_references.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn is_yield_allowed(&self) -> bool {
        self.yield_allowed
    }

    /// Finalizes the operation as if it were submitted in a batch starting at
    /// queue position 0.
    pub fn build(&self) -> OperationRequest {
        OperationRequest {
            kind: self.kind,
            uri: self.uri.clone(),
            selection: self.selection.clone(),
            values: self.values.clone(),
            value_back_references: self
                .value_back_references
                .iter()
                .map(|(k, r)| (k.clone(), r.original_index))
                .collect(),
            yield_allowed: self.yield_allowed,
        }
    }
}

/// Immutable operation as submitted to the store.
///
/// `value_back_references` hold positions relative to the submitted list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub uri: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    pub values: Values,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_back_references: BTreeMap<String, usize>,
    #[serde(default)]
    pub yield_allowed: bool,
}

impl fmt::Display for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.uri)?;
        if let Some(selection) = &self.selection {
            write!(f, " WHERE {} {:?}", selection.clause, selection.args)?;
        }
        for (key, value) in self.values.iter() {
            write!(f, " {key}={value}")?;
        }
        for (key, index) in &self.value_back_references {
            write!(f, " {key}=<backref {index}>")?;
        }
        if self.yield_allowed {
            write!(f, " [yield]")?;
        }
        Ok(())
    }
}

/// Outcome of a single applied operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    /// Number of rows touched by an update or delete.
    Count(u64),
    /// Locator of the row created by an insert.
    Uri(Url),
}

impl OperationResult {
    /// Number of rows this result stands for in the affected count.
    pub fn affected(&self) -> u64 {
        match self {
            OperationResult::Count(count) => *count,
            OperationResult::Uri(_) => 1,
        }
    }

    pub fn uri(&self) -> Option<&Url> {
        match self {
            OperationResult::Uri(uri) => Some(uri),
            OperationResult::Count(_) => None,
        }
    }

    /// Row id of an inserted row, taken from the last path segment of its locator.
    pub fn id(&self) -> Option<i64> {
        self.uri()?
            .path_segments()?
            .next_back()?
            .parse()
            .ok()
    }
}
