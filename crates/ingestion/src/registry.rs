//! Adapter registry
//!
//! Maps a configured `source_type` to a constructor. Adding a manufacturer
//! means registering one more constructor here; nothing else changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{SourceAdapter, SourceConfig};
use tracing::debug;

use crate::adapters::{ClarityAdapter, PurpleAirAdapter};
use crate::error::{IngestionError, Result};
use crate::mock::{SyntheticAdapter, SyntheticConfig};

/// Adapter constructor
pub type AdapterConstructor =
    Arc<dyn Fn(&SourceConfig) -> Result<Arc<dyn SourceAdapter>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    constructors: BTreeMap<String, AdapterConstructor>,
}

impl AdapterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `purpleair`, `clarity` and `mock` adapters
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("purpleair", |source| {
            let key = require_credentials(source)?;
            Ok(Arc::new(PurpleAirAdapter::new(source, key)?) as Arc<dyn SourceAdapter>)
        });
        registry.register("clarity", |source| {
            let key = require_credentials(source)?;
            Ok(Arc::new(ClarityAdapter::new(source, key)?) as Arc<dyn SourceAdapter>)
        });
        registry.register("mock", |source| {
            let config = SyntheticConfig::from_source(source)?;
            Ok(Arc::new(SyntheticAdapter::new(&source.id, config)) as Arc<dyn SourceAdapter>)
        });
        registry
    }

    /// Register (or replace) a constructor
    pub fn register<F>(&mut self, source_type: impl Into<String>, constructor: F)
    where
        F: Fn(&SourceConfig) -> Result<Arc<dyn SourceAdapter>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(source_type.into(), Arc::new(constructor));
    }

    pub fn contains(&self, source_type: &str) -> bool {
        self.constructors.contains_key(source_type)
    }

    /// Registered source types, sorted
    pub fn source_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build the adapter for one source
    ///
    /// # Errors
    /// Unknown `source_type`, missing credentials or invalid params
    pub fn build(&self, source: &SourceConfig) -> Result<Arc<dyn SourceAdapter>> {
        let constructor = self.constructors.get(&source.source_type).ok_or_else(|| {
            IngestionError::UnknownSourceType {
                source_id: source.id.clone(),
                source_type: source.source_type.clone(),
            }
        })?;
        let adapter = constructor(source)?;
        debug!(
            source_id = %source.id,
            source_type = %source.source_type,
            manufacturer = adapter.manufacturer(),
            "adapter built"
        );
        Ok(adapter)
    }
}

/// Resolve the credentials referenced by `credentials_env`
///
/// Returns `Ok(None)` when the source references no credentials.
pub fn resolve_credentials(source: &SourceConfig) -> Result<Option<String>> {
    let Some(env) = source.credentials_env.as_deref() else {
        return Ok(None);
    };
    match std::env::var(env) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
        _ => Err(IngestionError::MissingCredentials {
            source_id: source.id.clone(),
            env: env.to_string(),
        }),
    }
}

fn require_credentials(source: &SourceConfig) -> Result<String> {
    resolve_credentials(source)?.ok_or_else(|| IngestionError::MissingCredentials {
        source_id: source.id.clone(),
        env: "<credentials_env not configured>".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedAdapter;

    #[test]
    fn test_defaults_registered() {
        let registry = AdapterRegistry::with_defaults();
        let types: Vec<_> = registry.source_types().collect();
        assert_eq!(types, vec!["clarity", "mock", "purpleair"]);
    }

    #[test]
    fn test_unknown_type() {
        let registry = AdapterRegistry::with_defaults();
        let err = registry
            .build(&SourceConfig::new("x", "airnow", 60))
            .err()
            .unwrap();
        assert!(matches!(err, IngestionError::UnknownSourceType { .. }));
        assert_eq!(err.source_id(), "x");
    }

    #[test]
    fn test_missing_credentials() {
        let registry = AdapterRegistry::with_defaults();
        let mut source = SourceConfig::new("pa", "purpleair", 60);
        let err = registry.build(&source).err().unwrap();
        assert!(matches!(err, IngestionError::MissingCredentials { .. }));

        source.credentials_env = Some("AIRQ_TEST_SURELY_UNSET_KEY".into());
        let err = registry.build(&source).err().unwrap();
        assert!(err.to_string().contains("AIRQ_TEST_SURELY_UNSET_KEY"), "got: {err}");
    }

    #[test]
    fn test_custom_constructor() {
        let mut registry = AdapterRegistry::new();
        let scripted = Arc::new(ScriptedAdapter::new("s1"));
        let shared = scripted.clone();
        registry.register("scripted", move |_| Ok(shared.clone() as Arc<dyn SourceAdapter>));

        let adapter = registry.build(&SourceConfig::new("s1", "scripted", 60)).unwrap();
        assert_eq!(adapter.source_id(), "s1");
        assert!(registry.contains("scripted"));
    }

    #[test]
    fn test_mock_builds_without_credentials() {
        let registry = AdapterRegistry::with_defaults();
        let adapter = registry.build(&SourceConfig::new("m", "mock", 5)).unwrap();
        assert_eq!(adapter.manufacturer(), "Synthetic");
    }
}
