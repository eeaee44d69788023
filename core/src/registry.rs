//! Adapter registry (spec §4.4): keeps track of which adapters are
//! loaded, dispatches a URI to the adapter that claims it, and enforces
//! safe-mode opt-in for adapters that aren't vetted for autoloading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::adapter::{Adapter, AdapterFactory};
use crate::error::{Error, Result};

/// A process-wide registry, populated once at startup by whichever
/// adapter crates are linked in. Most programs only ever need this one;
/// [`AdapterRegistry::new`] exists for tests that want isolation from
/// adapters other tests have registered.
pub static GLOBAL: Lazy<Mutex<AdapterRegistry>> = Lazy::new(|| Mutex::new(AdapterRegistry::new()));

/// The two-pass `supports()` dispatch shared by [`AdapterRegistry::find`]
/// and [`crate::connection::Connection`]'s auto-materialization, which
/// searches over a connection's already-resolved candidate list rather
/// than the whole registry.
pub fn find_in(candidates: &[Arc<dyn AdapterFactory>], uri: &str) -> Result<Arc<dyn AdapterFactory>> {
    let mut deferred = Vec::new();
    for factory in candidates {
        match factory.supports(uri, true) {
            Some(true) => return Ok(factory.clone()),
            Some(false) => continue,
            None => deferred.push(factory.clone()),
        }
    }
    for factory in deferred {
        if factory.supports(uri, false) == Some(true) {
            return Ok(factory);
        }
    }

    Err(Error::programming(format!(
        "No adapter found for URI: {uri}"
    )))
}

/// A lazily-constructed factory (spec §4.4 `register(name, module,
/// class)`): the Rust equivalent of deferring a `module:ClassName` import
/// until the adapter is actually needed is a closure invoked on demand.
type Loader = Box<dyn Fn() -> Result<Arc<dyn AdapterFactory>> + Send + Sync>;

pub struct AdapterRegistry {
    /// Eagerly-registered factories. More than one factory may share a
    /// name (e.g. two crates both claiming `"csv"`); `load_all` in safe
    /// mode treats that as [`Status::UnsafeAdapters`] rather than
    /// silently picking one.
    factories: HashMap<&'static str, Vec<Arc<dyn AdapterFactory>>>,
    loaders: HashMap<&'static str, Vec<Loader>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            loaders: HashMap::new(),
        }
    }

    /// Register an adapter factory under its own name. Unlike lazy
    /// [`register`](Self::register), this makes the factory immediately
    /// visible to [`get`](Self::get)/[`dispatch`](Self::dispatch); more
    /// than one factory may share a name, with ambiguity only surfacing
    /// later, in [`load_all`](Self::load_all) under safe mode.
    pub fn add(&mut self, factory: Arc<dyn AdapterFactory>) {
        self.factories.entry(factory.name()).or_default().push(factory);
    }

    /// Register a loader under `name`, to be invoked the first time
    /// [`load`](Self::load)/[`load_all`](Self::load_all) needs an adapter
    /// by that name rather than at registration time (spec §4.4
    /// `register(name, module, class)`).
    pub fn register(
        &mut self,
        name: &'static str,
        loader: impl Fn() -> Result<Arc<dyn AdapterFactory>> + Send + Sync + 'static,
    ) {
        self.loaders.entry(name).or_default().push(Box::new(loader));
    }

    /// Resolve `name` to a factory: an already-`add`-ed one if present,
    /// otherwise the first loader registered under `name` that
    /// constructs successfully (spec §4.4 `load(name, warn=false)`).
    /// Each failing loader's error is logged when `warn` is `true`
    /// before the next one is tried, mirroring a Python backend logging
    /// `"Couldn't load adapter %s"` and moving on.
    pub fn load(&mut self, name: &str, warn: bool) -> Result<Arc<dyn AdapterFactory>> {
        if let Some(factory) = self.factories.get(name).and_then(|v| v.first()).cloned() {
            return Ok(factory);
        }

        let Some(loaders) = self.loaders.get(name) else {
            return Err(Error::interface(format!(
                "No loader registered for adapter: {name}"
            )));
        };

        for loader in loaders {
            match loader() {
                Ok(factory) => {
                    self.factories.entry(factory.name()).or_default().push(factory.clone());
                    return Ok(factory);
                }
                Err(err) => {
                    if warn {
                        log::warn!("Couldn't load adapter {name}: {err}");
                    }
                }
            }
        }

        Err(Error::interface(format!("Couldn't load adapter: {name}")))
    }

    /// Safe-mode-aware ordered listing of every adapter eligible for
    /// autoload (spec §4.4 `load_all(names?, safe?)`). With `safe`, an
    /// adapter is excluded unless it's `is_safe()` or named explicitly in
    /// `names`; if more than one *safe* adapter shares a name under
    /// `safe`, that's ambiguous and rejected outright rather than
    /// silently taking the first one.
    pub fn load_all(
        &self,
        names: Option<&[String]>,
        safe: bool,
    ) -> Result<Vec<(&'static str, Arc<dyn AdapterFactory>)>> {
        let mut keys: Vec<&'static str> = match names {
            Some(names) => names
                .iter()
                .filter_map(|n| self.factories.keys().find(|k| *k == n).copied())
                .collect(),
            None => {
                let mut ks: Vec<&'static str> = self.factories.keys().copied().collect();
                ks.sort_unstable();
                ks
            }
        };
        keys.dedup();

        let mut result = Vec::new();
        for name in keys {
            let named_explicitly = names.is_some_and(|ns| ns.iter().any(|n| n == name));
            let eligible: Vec<Arc<dyn AdapterFactory>> = self
                .factories
                .get(name)
                .into_iter()
                .flatten()
                .filter(|f| !safe || f.is_safe() || named_explicitly)
                .cloned()
                .collect();

            if eligible.is_empty() {
                continue;
            }
            if safe && eligible.len() > 1 && eligible.iter().all(|f| f.is_safe()) {
                return Err(Error::unsafe_adapters(format!(
                    "Multiple safe adapters registered under name: {name}"
                )));
            }
            result.push((name, eligible[0].clone()));
        }
        Ok(result)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AdapterFactory>> {
        self.factories.get(name).and_then(|v| v.first()).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Every factory eligible under `only`/`safe`, for registering SQLite
    /// modules up front at connection-open time (spec §4.5: one module
    /// per adapter class).
    pub fn candidates(&self, only: &[String], safe: bool) -> Vec<Arc<dyn AdapterFactory>> {
        self.factories
            .values()
            .flatten()
            .filter(|f| only.is_empty() || only.iter().any(|n| n == f.name()))
            .filter(|f| !safe || f.is_safe() || only.iter().any(|n| n == f.name()))
            .cloned()
            .collect()
    }

    /// Find the factory that claims `uri`, without constructing it (spec
    /// §4.5 auto-materialization: the cursor needs the factory's name and
    /// `parse_uri` output before it can emit `CREATE VIRTUAL TABLE`).
    pub fn find(&self, uri: &str, only: &[String], safe: bool) -> Result<Arc<dyn AdapterFactory>> {
        let candidates = self.candidates(only, safe);
        if candidates.is_empty() && !only.is_empty() {
            return Err(Error::programming(format!(
                "Unknown adapter(s): {}",
                only.join(", ")
            )));
        }

        find_in(&candidates, uri)
    }

    /// Find the adapter that claims `uri` and construct it.
    ///
    /// `only` restricts the search to the named adapters regardless of
    /// safe mode; an empty slice means "all registered adapters". When
    /// `safe` is `true`, adapters whose `AdapterFactory::is_safe()` is
    /// `false` are skipped unless they're named explicitly in `only`.
    ///
    /// `supports()` is probed twice: first with `fast = true` over every
    /// candidate, then, if nothing matched, with `fast = false` over
    /// candidates that returned `None` the first time. This lets cheap
    /// adapters (scheme prefix match) answer before expensive ones
    /// (adapters that need to open a connection to tell) are tried.
    pub fn dispatch(
        &self,
        uri: &str,
        only: &[String],
        safe: bool,
        kwargs: &HashMap<String, String>,
    ) -> Result<Box<dyn Adapter>> {
        if !only.is_empty() {
            for name in only {
                let duplicate_count = only.iter().filter(|n| *n == name).count();
                if duplicate_count > 1 {
                    return Err(Error::programming(format!(
                        "Adapter {name} requested more than once"
                    )));
                }
            }
        }

        let factory = self.find(uri, only, safe)?;
        log::debug!("dispatching {uri} to adapter {}", factory.name());
        factory.construct(uri, kwargs)
    }

    /// Construct every registered adapter that claims `uri`, rather than
    /// stopping at the first match. Used by callers that want to detect
    /// ambiguous dispatch (spec §4.4 `UnsafeAdaptersError`) themselves
    /// instead of silently taking the first hit.
    pub fn dispatch_all(
        &self,
        uri: &str,
        safe: bool,
        kwargs: &HashMap<String, String>,
    ) -> Result<Vec<Box<dyn Adapter>>> {
        let mut matches = Vec::new();
        for factory in self.factories.values().flatten() {
            if safe && !factory.is_safe() {
                continue;
            }
            if factory.supports(uri, true).unwrap_or(false) {
                matches.push(factory.construct(uri, kwargs)?);
            }
        }
        if matches.is_empty() {
            return Err(Error::programming(format!(
                "No adapter found for URI: {uri}"
            )));
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::OrderSpec;
    use crate::error::Status;
    use crate::fields::Field;
    use crate::row::{Bounds, Row};
    use std::collections::HashMap;

    struct AlwaysFactory(&'static str, bool);

    impl AdapterFactory for AlwaysFactory {
        fn name(&self) -> &'static str {
            self.0
        }
        fn supports(&self, uri: &str, _fast: bool) -> Option<bool> {
            Some(uri.starts_with(self.0))
        }
        fn construct(&self, _uri: &str, _kwargs: &HashMap<String, String>) -> Result<Box<dyn Adapter>> {
            Ok(Box::new(StubAdapter))
        }
        fn is_safe(&self) -> bool {
            self.1
        }
    }

    struct StubAdapter;

    impl Adapter for StubAdapter {
        fn get_columns(&self) -> Result<Vec<(String, Box<dyn Field>)>> {
            Ok(Vec::new())
        }
        fn get_data(
            &self,
            _bounds: &Bounds,
            _order: &[OrderSpec],
            _limit: Option<u64>,
            _offset: Option<u64>,
            _requested_columns: Option<&[String]>,
        ) -> Result<Box<dyn Iterator<Item = Result<Row>>>> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn dispatch_picks_matching_scheme() {
        let mut registry = AdapterRegistry::new();
        registry.add(Arc::new(AlwaysFactory("dummy://", true)));
        registry.add(Arc::new(AlwaysFactory("csv://", true)));

        let adapter = registry.dispatch("dummy://foo", &[], false, &HashMap::new());
        assert!(adapter.is_ok());
    }

    #[test]
    fn dispatch_rejects_unknown_explicit_adapter() {
        let registry = AdapterRegistry::new();
        let err = registry
            .dispatch("dummy://foo", &["nope".to_string()], false, &HashMap::new())
            .unwrap_err();
        assert!(err.message.contains("Unknown adapter"));
    }

    #[test]
    fn dispatch_excludes_unsafe_adapters_by_default() {
        let mut registry = AdapterRegistry::new();
        registry.add(Arc::new(AlwaysFactory("dummy://", false)));
        let err = registry
            .dispatch("dummy://foo", &[], true, &HashMap::new())
            .unwrap_err();
        assert!(err.message.contains("No adapter found"));
    }

    #[test]
    fn dispatch_allows_unsafe_adapter_when_named_explicitly() {
        let mut registry = AdapterRegistry::new();
        registry.add(Arc::new(AlwaysFactory("dummy://", false)));
        let adapter = registry.dispatch(
            "dummy://foo",
            &["dummy://".to_string()],
            true,
            &HashMap::new(),
        );
        assert!(adapter.is_ok());
    }

    #[test]
    fn register_lazily_loads_on_first_use() {
        let mut registry = AdapterRegistry::new();
        registry.register("lazy://", || Ok(Arc::new(AlwaysFactory("lazy://", true))));
        assert!(registry.get("lazy://").is_none());

        let factory = registry.load("lazy://", false).unwrap();
        assert_eq!(factory.name(), "lazy://");
        assert!(registry.get("lazy://").is_some());
    }

    #[test]
    fn load_falls_through_failing_loaders() {
        let mut registry = AdapterRegistry::new();
        registry.register("flaky://", || Err(Error::operational("boom")));
        registry.register("flaky://", || Ok(Arc::new(AlwaysFactory("flaky://", true))));

        let factory = registry.load("flaky://", true).unwrap();
        assert_eq!(factory.name(), "flaky://");
    }

    #[test]
    fn load_all_rejects_duplicate_safe_adapters_under_one_name() {
        let mut registry = AdapterRegistry::new();
        registry.add(Arc::new(AlwaysFactory("dummy://", true)));
        registry.add(Arc::new(AlwaysFactory("dummy://", true)));

        let err = registry.load_all(None, true).unwrap_err();
        assert_eq!(err.status, Status::UnsafeAdapters);
    }

    #[test]
    fn load_all_allows_duplicates_outside_safe_mode() {
        let mut registry = AdapterRegistry::new();
        registry.add(Arc::new(AlwaysFactory("dummy://", true)));
        registry.add(Arc::new(AlwaysFactory("dummy://", true)));

        let loaded = registry.load_all(None, false).unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
