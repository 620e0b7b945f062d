//! Ordered header multimap.
//!
//! The abstract message model carries options as an ordered list of
//! key/value pairs where values are strings or integers and duplicate keys
//! are legal and order-significant.

use serde::{Deserialize, Serialize};

/// A header value: text or a small integer, as the option registry allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Int(i64),
    Text(String),
}

impl HeaderValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            HeaderValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::Text(_) => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Text(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Text(s)
    }
}

impl From<i64> for HeaderValue {
    fn from(i: i64) -> Self {
        HeaderValue::Int(i)
    }
}

/// Ordered multimap of headers. Duplicate keys are preserved in insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Append an entry, keeping any existing entries for the same key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// All values for `key`, in insertion order.
    pub fn all(&self, key: &str) -> Vec<&HeaderValue> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Remove every entry for `key`. Returns how many were removed.
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        before - self.entries.len()
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a HeaderValue);
    type IntoIter = std::vec::IntoIter<(&'a str, &'a HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_preserved_in_order() {
        let mut headers = Headers::new();
        headers.append("Uri-Query", "a=1");
        headers.append("Accept", 0i64);
        headers.append("Uri-Query", "b=2");

        let values = headers.all("Uri-Query");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_text(), Some("a=1"));
        assert_eq!(values[1].as_text(), Some("b=2"));
        assert_eq!(headers.get("Accept").and_then(HeaderValue::as_int), Some(0));
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut headers = Headers::new();
        headers.append("b", "second");
        headers.append("a", "first");
        let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn remove_drops_all_duplicates() {
        let mut headers = Headers::new();
        headers.append("x", 1i64);
        headers.append("x", 2i64);
        headers.append("y", 3i64);
        assert_eq!(headers.remove("x"), 2);
        assert!(headers.get("x").is_none());
        assert_eq!(headers.len(), 1);
    }
}
