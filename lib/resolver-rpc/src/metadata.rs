//! Call metadata carried as lower-case HTTP headers

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// Key/value metadata attached to a call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Insert a value; keys are case-insensitive
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect every header with a textual value
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut metadata = Self::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                metadata.insert(name.as_str(), value);
            }
        }
        metadata
    }

    /// Write entries into `headers`, skipping anything that is not a valid header
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        for (key, value) in self.iter() {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::debug!("Skipping metadata entry {} that is not a valid header", key),
            }
        }
    }
}
