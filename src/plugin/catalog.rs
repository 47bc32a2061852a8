//! Registry of plugin factories compiled into the binary.
//!
//! Deployment units name a plugin by symbol. Symbols found here are
//! instantiated through their factory; anything else has to be defined by the
//! unit itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::plugin::{builtin, Plugin};

type Factory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Symbol → plugin factory.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    factories: BTreeMap<String, Factory>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the plugins shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        builtin::register(&mut catalog);
        catalog
    }

    pub fn register<F>(&mut self, symbol: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(symbol.into(), Arc::new(factory));
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.factories.contains_key(symbol)
    }

    /// Create a fresh plugin instance for `symbol`.
    pub fn instantiate(&self, symbol: &str) -> Option<Arc<dyn Plugin>> {
        self.factories.get(symbol).map(|factory| factory())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerCatalog")
            .field("symbols", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
