//! In-memory and composite configuration sources.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::ConfigSource;

/// Fixed key/value pairs answering identically for every alias.
///
/// Repeated keys accumulate, so `lookup_all` sees each value in insertion
/// order while `lookup` returns the first.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, Vec<String>>,
}

impl MapSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut source = Self::new();
        for (key, value) in pairs {
            source.insert(key, value);
        }
        source
    }

    /// Add a value for `key`.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> &mut Self {
        self.values
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigSource for MapSource {
    fn lookup(&self, _alias: &str, key: &str) -> Option<String> {
        self.values
            .get(&key.to_ascii_lowercase())
            .and_then(|values| values.first().cloned())
    }

    fn lookup_all(&self, _alias: &str, key: &str) -> Option<Vec<String>> {
        self.values.get(&key.to_ascii_lowercase()).cloned()
    }
}

/// Several sources queried in registration order; the first that has a key
/// answers for it.
#[derive(Clone, Default)]
pub struct CombinedSource {
    sources: Vec<Arc<dyn ConfigSource>>,
}

impl CombinedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower precedence than those already added.
    pub fn push(&mut self, source: Arc<dyn ConfigSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn with(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ConfigSource for CombinedSource {
    fn lookup(&self, alias: &str, key: &str) -> Option<String> {
        self.sources
            .iter()
            .find_map(|source| source.lookup(alias, key))
    }

    fn lookup_all(&self, alias: &str, key: &str) -> Option<Vec<String>> {
        self.sources
            .iter()
            .find_map(|source| source.lookup_all(alias, key))
    }
}

impl std::fmt::Debug for CombinedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedSource")
            .field("sources", &self.sources.len())
            .finish()
    }
}
