//! Connection-time configuration (spec §9 "Dynamic kwargs").
//!
//! An adapter's constructor often needs more than just a URI — API keys,
//! auth tokens, pagination sizes. Those are supplied per-adapter, by
//! adapter name, at [`connection::Connection::open`] time rather than
//! threaded through every call site.

use std::collections::HashMap;

/// Free-form arguments passed to one adapter's `AdapterFactory::construct`.
/// Adapters that want typed configuration parse `extra` themselves;
/// this crate only plumbs the strings through.
#[derive(Debug, Clone, Default)]
pub struct AdapterKwargs {
    pub extra: HashMap<String, String>,
}

impl AdapterKwargs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Options accepted by [`connection::Connection::open`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Restrict dispatch to these adapter names. Empty means "every
    /// registered adapter is a candidate".
    pub adapters: Vec<String>,
    /// If `true`, only adapters that declare themselves safe are used,
    /// unless named explicitly in `adapters` (spec §4.4 safe mode).
    pub safe: bool,
    /// Per-adapter-name construction arguments.
    pub adapter_kwargs: HashMap<String, AdapterKwargs>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapters(mut self, adapters: Vec<String>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    pub fn kwargs_for(&self, adapter_name: &str) -> HashMap<String, String> {
        self.adapter_kwargs
            .get(adapter_name)
            .map(|k| k.extra.clone())
            .unwrap_or_default()
    }
}
