//! Data-source providers backing `on-data` templates
//!
//! Providers are registered per id and invoked by the template expander
//! when it reaches an `on-data` node. The contract is single-threaded
//! cooperative: `fetch` may block while it gathers external data, and
//! the expander waits for the result before continuing with dependent
//! siblings. Hosts with an async runtime wrap their `block_on` inside a
//! provider.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ast::values::Value;
use crate::errors::{PreprocessError, PreprocessErrorKind};
use crate::location::Location;
use crate::preprocess::scope::Scope;

/// A source of external data for `on-data` blocks.
pub trait DataProvider {
    /// Fetch the value backing one `on-data` node. The properties are
    /// already evaluated; the scope is read-only context.
    fn fetch(
        &self,
        id: &str,
        properties: &IndexMap<String, Value>,
        scope: &Scope,
    ) -> Result<Value, String>;
}

impl<F> DataProvider for F
where
    F: Fn(&str, &IndexMap<String, Value>, &Scope) -> Result<Value, String>,
{
    fn fetch(
        &self,
        id: &str,
        properties: &IndexMap<String, Value>,
        scope: &Scope,
    ) -> Result<Value, String> {
        self(id, properties, scope)
    }
}

/// Provider lookup table, registered per provider id.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn DataProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, provider: impl DataProvider + 'static) {
        self.providers.insert(id.into(), Box::new(provider));
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Invoke the provider for `id`, mapping both a missing provider
    /// and a provider failure to `DataSourceError`.
    pub fn fetch(
        &self,
        id: &str,
        properties: &IndexMap<String, Value>,
        scope: &Scope,
        location: &Location,
    ) -> Result<Value, PreprocessError> {
        let provider = self.providers.get(id).ok_or_else(|| {
            PreprocessError::at(
                PreprocessErrorKind::DataSource,
                format!("no data provider registered for '{}'", id),
                location.clone(),
            )
        })?;
        tracing::debug!(provider = id, "fetching data source");
        provider.fetch(id, properties, scope).map_err(|message| {
            PreprocessError::at(
                PreprocessErrorKind::DataSource,
                format!("data provider '{}' failed: {}", id, message),
                location.clone(),
            )
        })
    }
}
