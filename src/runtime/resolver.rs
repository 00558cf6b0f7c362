//! Name resolution: `"module.path.symbol"` → registered value.
//!
//! There is no runtime reflection: modules are provided up front as loader
//! functions keyed by module path.  A module is loaded on first use and
//! reused afterwards, so [`ModuleRegistry::resolve`] behaves like an import
//! followed by an attribute lookup.
//!
//! ```text
//! resolve("cmd.basic.echo")
//!     └─ split on last '.' → module "cmd.basic", symbol "echo"
//!         ├─ loaded?  yes → reuse
//!         │           no  → run loader, cache module
//!         └─ symbol lookup → Symbol { module, name, value }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::core::error::NameResolutionError;

/// Separator between module path segments and the symbol name.
pub const SEPARATOR: char = '.';

/// A loaded module: an ordered table of named values.
#[derive(Debug, Clone)]
pub struct Module<T> {
    name: String,
    symbols: BTreeMap<String, T>,
}

impl<T> Module<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), symbols: BTreeMap::new() }
    }

    /// Builder-style symbol registration.
    pub fn with(mut self, symbol: impl Into<String>, value: T) -> Self {
        self.symbols.insert(symbol.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, symbol: &str) -> Option<&T> {
        self.symbols.get(symbol)
    }

    /// Symbol names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }
}

/// A resolved value together with the name it was found under.
#[derive(Debug, Clone)]
pub struct Symbol<T> {
    module: String,
    name: String,
    value: T,
}

impl<T> Symbol<T> {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// `module.name`; resolving this string yields the same symbol again.
    pub fn qualified_name(&self) -> String {
        format!("{}{SEPARATOR}{}", self.module, self.name)
    }
}

type Loader<T> = Box<dyn Fn() -> Module<T> + Send + Sync>;

/// Process-wide table of module loaders and loaded modules.
pub struct ModuleRegistry<T> {
    loaders: RwLock<HashMap<String, Loader<T>>>,
    loaded: RwLock<HashMap<String, Arc<Module<T>>>>,
}

impl<T> Default for ModuleRegistry<T> {
    fn default() -> Self {
        Self {
            loaders: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> ModuleRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make module `name` loadable.  Replaces an earlier loader for the same
    /// name; an already loaded copy stays cached until [`Self::unload`].
    pub fn provide<F>(&self, name: impl Into<String>, loader: F)
    where
        F: Fn() -> Module<T> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(module = %name, "module provided");
        self.loaders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Box::new(loader));
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of every module that has a loader, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Return the cached module, or run its loader and cache the result.
    pub fn load(&self, name: &str) -> Result<Arc<Module<T>>, NameResolutionError> {
        if let Some(module) = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(module.clone());
        }

        let module = {
            let loaders = self.loaders.read().unwrap_or_else(PoisonError::into_inner);
            let loader = loaders
                .get(name)
                .ok_or_else(|| NameResolutionError::ModuleNotFound(name.to_string()))?;
            Arc::new(loader())
        };

        debug!(module = %name, symbols = module.symbols.len(), "module loaded");
        // Two racing loads both run the loader; the first insert wins.
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        Ok(loaded.entry(name.to_string()).or_insert(module).clone())
    }

    pub fn unload(&self, name: &str) -> bool {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Resolve a fully-qualified `module.symbol` name.
    pub fn resolve(&self, qualified: &str) -> Result<Symbol<T>, NameResolutionError> {
        let (module_name, symbol) = split_qualified(qualified)?;
        let module = self.load(module_name)?;
        let value = module
            .get(symbol)
            .cloned()
            .ok_or_else(|| NameResolutionError::SymbolNotFound {
                module: module_name.to_string(),
                symbol: symbol.to_string(),
            })?;
        Ok(Symbol {
            module: module_name.to_string(),
            name: symbol.to_string(),
            value,
        })
    }

    /// Enumerate the symbols of a module, loading it if necessary.
    pub fn symbols(&self, module: &str) -> Result<Vec<Symbol<T>>, NameResolutionError> {
        let loaded = self.load(module)?;
        Ok(loaded
            .symbols
            .iter()
            .map(|(name, value)| Symbol {
                module: module.to_string(),
                name: name.clone(),
                value: value.clone(),
            })
            .collect())
    }
}

fn split_qualified(qualified: &str) -> Result<(&str, &str), NameResolutionError> {
    match qualified.rsplit_once(SEPARATOR) {
        Some((module, symbol)) if !module.is_empty() && !symbol.is_empty() => Ok((module, symbol)),
        _ => Err(NameResolutionError::Malformed(qualified.to_string())),
    }
}
