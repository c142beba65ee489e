//! Ordered, case-insensitive header list.

use serde::{Deserialize, Serialize};

/// A list of HTTP headers.
///
/// Names are stored lower-cased, insertion order is preserved, and lookups
/// are case-insensitive. Headers are always copied into a request, never
/// shared with the caller that supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a header is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a header, replacing any previous value
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Append a value, combining with an existing header as `a, b`
    pub fn append(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            entry.1.push_str(", ");
            entry.1.push_str(value);
        } else {
            self.entries.push((name, value.to_string()));
        }
    }

    /// Remove a header, returning its previous value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let idx = self.entries.iter().position(|(k, _)| *k == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// The `content-type` header, if any
    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct headers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.set(k.as_ref(), v);
        }
        headers
    }
}
