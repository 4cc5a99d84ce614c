//! Captured path parameters.
//!
//! A small ordered list of `(name, value)` pairs filled by the route tree
//! during lookup. Lookups scan linearly; routes rarely carry more than a
//! handful of parameters, so the list stays inline (no heap) up to
//! [`MAX_INLINE_PARAMS`] entries.

use smallvec::SmallVec;

use crate::pool::Recycle;

/// Number of parameters stored inline before spilling to the heap.
/// Most REST-style routes carry at most four.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Insertion-ordered list of captured `(name, value)` path parameters.
///
/// `get` returns the value of the first matching name, or the empty string
/// when absent. URL path segments are never legitimately empty, so absence
/// and an explicit empty value need not be distinguished.
#[derive(Debug, Clone, Default)]
pub struct Params(SmallVec<[(String, String); MAX_INLINE_PARAMS]>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first parameter named `name`, or `""`.
    pub fn get(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Append a captured pair. Called by the route tree during lookup.
    pub fn push(&mut self, key: &str, value: &str) {
        self.0.push((key.to_string(), value.to_string()));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Recycle for Params {
    fn recycle(&mut self) {
        self.clear();
    }
}
