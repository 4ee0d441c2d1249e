//! An ordered, case-insensitive header multimap.
//!
//! HTTP header names compare case-insensitively, but the spelling a peer (or the application)
//! chose is kept for serialization. Entries stay in insertion order so that a serialized message
//! lists its headers in the order they were set.

use std::fmt;

/// Ordered collection of `(name, value)` header pairs with case-insensitive names.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMultimap {
    entries: Vec<(String, String)>,
}

impl HeaderMultimap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    /// Returns the first value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }

    /// Returns every value stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter().filter(move |(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Appends a value, keeping any value already stored under the same name.
    pub fn add<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces all values stored under `name` with a single one.
    ///
    /// The new entry takes the position of the first existing occurrence, or is appended when the
    /// name is new.
    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter().position(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(index) => {
                let mut position = 0;
                self.entries.retain(|(key, _)| {
                    let keep = position <= index || !key.eq_ignore_ascii_case(&name);
                    position += 1;
                    keep
                });
                self.entries[index] = (name, value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Removes every value stored under `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// Merges repeated headers into their first occurrence, joining the values with `,`.
    pub fn normalize(&mut self) {
        let mut merged: Vec<(String, String)> = Vec::with_capacity(self.entries.len());
        for (name, value) in self.entries.drain(..) {
            match merged.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
                Some((_, existing)) => {
                    existing.push(',');
                    existing.push_str(&value);
                }
                None => merged.push((name, value)),
            }
        }
        self.entries = merged;
    }

    /// Returns true if any comma separated token of the `name` header equals `token`,
    /// ignoring ASCII case.
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).flat_map(|value| value.split(',')).any(|item| item.trim().eq_ignore_ascii_case(token))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl fmt::Debug for HeaderMultimap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderMultimap {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = HeaderMultimap::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}
