//! MetadataStore implementations
//!
//! The scheduler polls a `MetadataStore` for `SourceConfig` records on a
//! bounded refresh interval.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use contracts::{ContractError, IngestBlueprint, MetadataStore, SourceConfig};
use tracing::debug;

use crate::parser::{self, ConfigFormat};
use crate::validator;

/// Re-reads the `[[sources]]` table of a config file on every load
pub struct FileMetadataStore {
    path: PathBuf,
    format: ConfigFormat,
}

impl FileMetadataStore {
    /// Create a store backed by a TOML/JSON file
    ///
    /// # Errors
    /// Unsupported or missing file extension
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ContractError> {
        let path = path.into();
        let format = crate::ConfigLoader::detect_format(&path)?;
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn load_sources(&self) -> Result<Vec<SourceConfig>, ContractError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let blueprint: IngestBlueprint = parser::parse(&content, self.format)?;
        validator::validate_sources(&blueprint.sources)?;
        debug!(
            path = %self.path.display(),
            sources = blueprint.sources.len(),
            "source configs loaded"
        );
        Ok(blueprint.sources)
    }
}

/// In-memory store, replaced wholesale by the owner
///
/// Used when configs come from somewhere other than a file (and in tests).
#[derive(Clone, Default)]
pub struct StaticMetadataStore {
    sources: Arc<RwLock<Vec<SourceConfig>>>,
}

impl StaticMetadataStore {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources: Arc::new(RwLock::new(sources)),
        }
    }

    /// Replace the current source set
    pub fn replace(&self, sources: Vec<SourceConfig>) {
        let mut guard = self
            .sources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = sources;
    }

    /// Apply an in-place edit to one source, returns false if absent
    pub fn update(&self, id: &str, edit: impl FnOnce(&mut SourceConfig)) -> bool {
        let mut guard = self
            .sources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.iter_mut().find(|source| source.id == id) {
            Some(source) => {
                edit(source);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MetadataStore for StaticMetadataStore {
    async fn load_sources(&self) -> Result<Vec<SourceConfig>, ContractError> {
        let guard = self
            .sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        validator::validate_sources(&guard)?;
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_store_reloads_changes() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[sources]]
id = "pa-west"
source_type = "purpleair"
interval_secs = 120
"#
        )
        .unwrap();

        let store = FileMetadataStore::new(file.path()).unwrap();
        let sources = store.load_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].interval_secs, 120);

        std::fs::write(
            file.path(),
            r#"
[[sources]]
id = "pa-west"
source_type = "purpleair"
interval_secs = 60

[[sources]]
id = "clarity-east"
source_type = "clarity"
interval_secs = 300
"#,
        )
        .unwrap();

        let sources = store.load_sources().await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].interval_secs, 60);
    }

    #[tokio::test]
    async fn test_file_store_rejects_invalid_sources() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[sources]]
id = "bad"
source_type = "purpleair"
interval_secs = 0
"#
        )
        .unwrap();

        let store = FileMetadataStore::new(file.path()).unwrap();
        assert!(store.load_sources().await.is_err());
    }

    #[test]
    fn test_file_store_requires_known_extension() {
        assert!(FileMetadataStore::new("sources.yaml").is_err());
    }

    #[tokio::test]
    async fn test_static_store_update() {
        let store = StaticMetadataStore::new(vec![SourceConfig::new("a", "mock", 10)]);
        assert!(store.update("a", |source| source.interval_secs = 20));
        assert!(!store.update("missing", |_| {}));
        let sources = store.load_sources().await.unwrap();
        assert_eq!(sources[0].interval_secs, 20);
    }
}
