use crate::error::NervaError;
use serde::{Deserialize, Serialize};

/// A value stored in a [Dictionary].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DictValue {
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar
    Int(i64),
    /// Floating point scalar
    Float(f64),
    /// String
    Str(String),
    /// Ordered sequence of values
    List(Vec<DictValue>),
    /// Nested dictionary
    Dict(Dictionary),
}

/// An ordered key to value dictionary: the sole persisted representation
/// of composite graphs. Insertion order is preserved so serialization is
/// deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    entries: Vec<(String, DictValue)>,
}

impl Dictionary {
    /// Create an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under `key`, replacing any previous value while
    /// keeping its position.
    pub fn insert(&mut self, key: impl Into<String>, value: DictValue) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Get the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DictValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Check if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DictValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an integer stored under `key`, or a malformed-dictionary error.
    pub fn get_int(&self, key: &str) -> Result<i64, NervaError> {
        if let Some(DictValue::Int(x)) = self.get(key) {
            Ok(*x)
        } else {
            Err(malformed(key, "an integer"))
        }
    }

    /// Get a float stored under `key`, or a malformed-dictionary error.
    pub fn get_float(&self, key: &str) -> Result<f64, NervaError> {
        if let Some(DictValue::Float(x)) = self.get(key) {
            Ok(*x)
        } else {
            Err(malformed(key, "a float"))
        }
    }

    /// Get a string stored under `key`, or a malformed-dictionary error.
    pub fn get_str(&self, key: &str) -> Result<&str, NervaError> {
        if let Some(DictValue::Str(x)) = self.get(key) {
            Ok(x)
        } else {
            Err(malformed(key, "a string"))
        }
    }

    /// Get a list stored under `key`, or a malformed-dictionary error.
    pub fn get_list(&self, key: &str) -> Result<&[DictValue], NervaError> {
        if let Some(DictValue::List(x)) = self.get(key) {
            Ok(x)
        } else {
            Err(malformed(key, "a list"))
        }
    }

    /// Get a nested dictionary stored under `key`, or a
    /// malformed-dictionary error.
    pub fn get_dict(&self, key: &str) -> Result<&Dictionary, NervaError> {
        if let Some(DictValue::Dict(x)) = self.get(key) {
            Ok(x)
        } else {
            Err(malformed(key, "a dictionary"))
        }
    }
}

fn malformed(key: &str, expected: &str) -> NervaError {
    NervaError::MalformedDictionary(format!("expected {expected} under key {key:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved() {
        let mut d = Dictionary::new();
        d.insert("zebra", DictValue::Int(1));
        d.insert("apple", DictValue::Int(2));
        d.insert("zebra", DictValue::Int(3));
        let keys: Vec<&str> = d.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zebra", "apple"]);
        assert_eq!(d.get_int("zebra").unwrap(), 3);
    }

    #[test]
    fn typed_getters_reject_wrong_types() {
        let mut d = Dictionary::new();
        d.insert("version", DictValue::Int(2));
        assert!(d.get_str("version").is_err());
        assert!(d.get_int("missing").is_err());
        assert_eq!(d.get_int("version").unwrap(), 2);
    }
}
