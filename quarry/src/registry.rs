//! Source registry
//!
//! The engine only reads from the registry. [`InMemoryRegistry`] also offers
//! the write side used by the binaries and tests, with writes serialized
//! behind one lock.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::path::Path;

use crate::source::{DataSource, SourceKind, SourceStatus};
use crate::{Error, Result};

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Case-insensitive lookup by display name.
    async fn get_source_by_name(&self, name: &str) -> Result<Option<DataSource>>;

    /// Sources linked to at least one of `categories`.
    async fn get_sources_for_categories(&self, categories: &[String]) -> Result<Vec<DataSource>>;

    /// Store the outcome of a connection test.
    async fn record_test_result(&self, _id: &str, _error: Option<String>) -> Result<()> {
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Registry held in memory, optionally seeded from a sources file
#[derive(Default)]
pub struct InMemoryRegistry {
    sources: RwLock<Vec<DataSource>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: Vec<DataSource>) -> Result<Self> {
        let registry = Self::new();
        for source in sources {
            registry.insert(source)?;
        }
        Ok(registry)
    }

    /// Load a JSON or YAML list of sources.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let sources: Vec<DataSource> = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        tracing::info!("Loaded {} sources from {:?}", sources.len(), path);
        Self::with_sources(sources)
    }

    /// Write all sources, as YAML for a `.yaml`/`.yml` path and pretty JSON otherwise.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let sources = self.sources.read();
        let content = if is_yaml(path) {
            serde_yaml::to_string(&*sources)?
        } else {
            serde_json::to_string_pretty(&*sources)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<DataSource> {
        self.sources.read().iter().find(|s| s.id == id).cloned()
    }

    pub fn list(&self) -> Vec<DataSource> {
        self.sources.read().clone()
    }

    /// Add a source. Names are unique, ignoring case.
    pub fn insert(&self, source: DataSource) -> Result<()> {
        let mut sources = self.sources.write();
        if sources
            .iter()
            .any(|s| s.id == source.id || s.name.eq_ignore_ascii_case(&source.name))
        {
            return Err(Error::Registry(format!(
                "A source named '{}' already exists",
                source.name
            )));
        }
        sources.push(source);
        Ok(())
    }

    /// Replace a source by id, keeping its audit fields.
    pub fn update(&self, mut source: DataSource) -> Result<()> {
        let mut sources = self.sources.write();
        if sources
            .iter()
            .any(|s| s.id != source.id && s.name.eq_ignore_ascii_case(&source.name))
        {
            return Err(Error::Registry(format!(
                "A source named '{}' already exists",
                source.name
            )));
        }
        let existing = sources
            .iter_mut()
            .find(|s| s.id == source.id)
            .ok_or_else(|| Error::Registry(format!("Unknown source id: {}", source.id)))?;

        source.created_by = existing.created_by.clone();
        source.created_at = existing.created_at;
        source.updated_at = Utc::now();
        *existing = source;
        Ok(())
    }

    /// Remove a source by id. A tabular source's stored file is deleted too.
    pub async fn remove(&self, id: &str) -> Result<Option<DataSource>> {
        let removed = {
            let mut sources = self.sources.write();
            let idx = sources.iter().position(|s| s.id == id);
            idx.map(|i| sources.remove(i))
        };

        if let Some(DataSource {
            kind: SourceKind::Csv(tabular),
            ..
        }) = &removed
        {
            match tokio::fs::remove_file(&tabular.file_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl SourceRegistry for InMemoryRegistry {
    async fn get_source_by_name(&self, name: &str) -> Result<Option<DataSource>> {
        let name = name.trim();
        Ok(self
            .sources
            .read()
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn get_sources_for_categories(&self, categories: &[String]) -> Result<Vec<DataSource>> {
        Ok(self
            .sources
            .read()
            .iter()
            .filter(|s| s.is_queryable_by(categories))
            .cloned()
            .collect())
    }

    async fn record_test_result(&self, id: &str, error: Option<String>) -> Result<()> {
        let mut sources = self.sources.write();
        let source = sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::Registry(format!("Unknown source id: {}", id)))?;

        let now = Utc::now();
        source.status = if error.is_some() {
            SourceStatus::Error
        } else {
            SourceStatus::Active
        };
        source.last_tested = Some(now);
        source.last_error = error;
        source.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ApiSource, TabularSource};
    use crate::tabular::ParseOptions;

    fn api_source(name: &str, categories: &[&str]) -> DataSource {
        DataSource::new(
            name,
            categories.iter().map(|c| c.to_string()).collect(),
            SourceKind::Api(ApiSource::new("https://api.test/x")),
        )
    }

    #[tokio::test]
    async fn test_lookup_case_insensitive() {
        let registry = InMemoryRegistry::with_sources(vec![api_source("Claims", &["hr"])]).unwrap();
        assert!(registry.get_source_by_name("claims").await.unwrap().is_some());
        assert!(registry.get_source_by_name(" CLAIMS ").await.unwrap().is_some());
        assert!(registry.get_source_by_name("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_category_scoping() {
        let registry = InMemoryRegistry::with_sources(vec![
            api_source("a", &["hr"]),
            api_source("b", &["it"]),
            api_source("hidden", &[]),
        ])
        .unwrap();
        let visible = registry
            .get_sources_for_categories(&["hr".to_string(), "finance".to_string()])
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "a");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = InMemoryRegistry::new();
        registry.insert(api_source("dup", &["hr"])).unwrap();
        assert!(matches!(
            registry.insert(api_source("DUP", &["hr"])),
            Err(Error::Registry(_))
        ));
    }

    #[test]
    fn test_update_keeps_audit_fields() {
        let registry = InMemoryRegistry::new();
        let mut original = api_source("s", &["hr"]);
        original.created_by = Some("admin".to_string());
        let id = original.id.clone();
        let created_at = original.created_at;
        registry.insert(original.clone()).unwrap();

        let mut changed = original;
        changed.created_by = None;
        changed.description = "new".to_string();
        registry.update(changed).unwrap();

        let stored = registry.get(&id).unwrap();
        assert_eq!(stored.description, "new");
        assert_eq!(stored.created_by.as_deref(), Some("admin"));
        assert_eq!(stored.created_at, created_at);
    }

    #[tokio::test]
    async fn test_record_test_result() {
        let source = api_source("s", &["hr"]);
        let id = source.id.clone();
        let registry = InMemoryRegistry::with_sources(vec![source]).unwrap();

        registry
            .record_test_result(&id, Some("HTTP 500".to_string()))
            .await
            .unwrap();
        let stored = registry.get(&id).unwrap();
        assert_eq!(stored.status, SourceStatus::Error);
        assert!(stored.last_tested.is_some());

        registry.record_test_result(&id, None).await.unwrap();
        let stored = registry.get(&id).unwrap();
        assert_eq!(stored.status, SourceStatus::Active);
        assert!(stored.last_error.is_none());
    }

    #[tokio::test]
    async fn test_remove_deletes_stored_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("f.csv");
        std::fs::write(&file_path, "a\n1\n").unwrap();

        let source = DataSource::new(
            "file",
            vec!["hr".to_string()],
            SourceKind::Csv(TabularSource {
                file_path: file_path.clone(),
                original_filename: "f.csv".to_string(),
                columns: vec![],
                sample_rows: vec![],
                row_count: 1,
                file_size: 4,
                options: ParseOptions::default(),
                ingested_at: None,
            }),
        );
        let id = source.id.clone();
        let registry = InMemoryRegistry::with_sources(vec![source]).unwrap();

        assert!(registry.remove(&id).await.unwrap().is_some());
        assert!(!file_path.exists());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("sources.yaml");
        std::fs::write(
            &yaml,
            r#"
- id: s1
  name: claims
  categoryIds: [hr]
  sourceType: api
  endpoint: https://api.test/claims
"#,
        )
        .unwrap();
        let registry = InMemoryRegistry::load_from_file(&yaml).unwrap();
        assert_eq!(registry.len(), 1);

        let json = dir.path().join("sources.json");
        registry.save_to_file(&json).unwrap();
        let reloaded = InMemoryRegistry::load_from_file(&json).unwrap();
        assert_eq!(reloaded.list()[0].name, "claims");
    }
}
