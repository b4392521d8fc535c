use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::Error;
use crate::util::{parse_header_name, parse_header_value};

const REDACTION_MARKER: &str = "[REDACTED]";

/// Case-insensitive header map with stable insertion order.
///
/// Keys canonicalize through [`HeaderName`] (lower-cased, validated), so
/// `Content-Type` and `content-type` address the same entry. A logical key
/// keeps the position of its first insertion; later writes replace the value
/// in place. Used for outgoing request headers and parsed response headers
/// alike.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderStore {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets a header from string parts, validating both. Last write wins.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        self.insert(name, value);
        Ok(())
    }

    /// Sets an already-validated header. Authorization values are marked
    /// sensitive so they stay out of wire traces.
    pub fn insert(&mut self, name: HeaderName, mut value: HeaderValue) {
        if name == AUTHORIZATION {
            value.set_sensitive(true);
        }
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.entries
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value)
    }

    /// Header value as UTF-8 text, `None` when absent or not valid UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        let index = self
            .entries
            .iter()
            .position(|(existing, _)| *existing == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(name, value)| (name, value))
    }

    /// Layers `overrides` on top of this store; overridden keys keep their
    /// original position, new keys append in iteration order.
    pub fn merge(&mut self, overrides: &HeaderStore) {
        for (name, value) in overrides.iter() {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Rendering for diagnostics only: the authorization value is replaced
    /// with a marker. Never feeds back into the request sent.
    pub fn redacted(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, value)| {
                let rendered = if *name == AUTHORIZATION {
                    REDACTION_MARKER.to_owned()
                } else {
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                };
                (name.as_str().to_owned(), rendered)
            })
            .collect()
    }

    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.insert(name.clone(), value.clone());
        }
        map
    }

    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut store = Self::new();
        for (name, value) in map {
            store.insert(name.clone(), value.clone());
        }
        store
    }
}

