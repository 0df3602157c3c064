//! Field values carried by store operations.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// A literal column value as understood by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Column name → value map of one row.
///
/// Keys are kept sorted so that requests render deterministically in logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Values(BTreeMap<String, Value>);

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether `key` is present with a non-null value.
    pub fn contains_not_null(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// Copies all entries of `other` into this map, overwriting existing keys.
    pub fn merge(&mut self, other: Values) {
        self.0.extend(other.0);
    }

    /// Drops text values that are empty or consist only of whitespace.
    pub fn remove_blank(mut self) -> Self {
        self.0
            .retain(|_, v| !matches!(v, Value::Text(s) if s.trim().is_empty()));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl AddAssign for Values {
    fn add_assign(&mut self, other: Values) {
        self.merge(other);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Values(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Values {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_blank() {
        let mut values = Values::new();
        values.put("key1", "value");
        values.put("key2", 1i64);
        values.put("key3", "");
        values.put("key4", "\n");
        values.put("key5", " \n ");
        values.put("key6", " ");

        let values = values.remove_blank();

        assert_eq!(values.get("key1"), Some(&Value::Text("value".into())));
        assert_eq!(values.get("key2"), Some(&Value::Integer(1)));
        for key in ["key3", "key4", "key5", "key6"] {
            assert!(values.get(key).is_none(), "{key} should have been removed");
        }
    }

    #[test]
    fn test_merge_overwrites() {
        let mut values: Values = [("title", "Old"), ("location", "Vienna")].into_iter().collect();
        values += [("title", "New")].into_iter().collect::<Values>();

        assert_eq!(values.len(), 2);
        assert_eq!(values.get("title").and_then(Value::as_text), Some("New"));
        assert_eq!(values.get("location").and_then(Value::as_text), Some("Vienna"));
    }

    #[test]
    fn test_contains_not_null() {
        let mut values = Values::new();
        values.put("dtstart", 1_700_000_000_000i64);
        values.put("dtend", Value::Null);

        assert!(values.contains_not_null("dtstart"));
        assert!(!values.contains_not_null("dtend"));
        assert!(!values.contains_not_null("duration"));
    }
}
