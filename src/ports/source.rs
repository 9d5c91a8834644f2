//! Configuration Source Port
//!
//! A read-only, ssh_config-shaped key/value store queried per host alias.
//! Keys are matched case-insensitively by every implementation.

/// Per-alias key/value configuration lookups.
pub trait ConfigSource: Send + Sync {
    /// First value for `key` that applies to `alias`, if any.
    fn lookup(&self, alias: &str, key: &str) -> Option<String>;

    /// Every value for `key` that applies to `alias`, in source order.
    ///
    /// `None` when the key is absent. `Some(vec![])` is never returned for a
    /// present key; an empty value is reported as `Some(vec![String::new()])`.
    fn lookup_all(&self, alias: &str, key: &str) -> Option<Vec<String>>;
}

/// A [`ConfigSource`] bound to a single alias.
#[derive(Clone, Copy)]
pub struct AliasView<'a> {
    source: &'a dyn ConfigSource,
    alias: &'a str,
}

impl<'a> AliasView<'a> {
    #[must_use]
    pub fn new(source: &'a dyn ConfigSource, alias: &'a str) -> Self {
        Self { source, alias }
    }

    #[must_use]
    pub const fn alias(&self) -> &'a str {
        self.alias
    }

    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.source.lookup(self.alias, key)
    }

    #[must_use]
    pub fn lookup_all(&self, key: &str) -> Option<Vec<String>> {
        self.source.lookup_all(self.alias, key)
    }
}
