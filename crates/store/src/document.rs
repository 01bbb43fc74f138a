//! The persisted document and where it lives.
//!
//! Every collection is held in one JSON document. A backend only knows how to
//! load the whole document and save the whole document; transactional
//! behaviour lives in [`crate::pool::StorePool`].

use async_trait::async_trait;
use resguard_core::error::StoreError;
use resguard_core::{Intervention, Message, UserProfile, WorkoutLog};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// The full persisted state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub user_profiles: Vec<UserProfile>,
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    #[serde(default)]
    pub workout_logs: Vec<WorkoutLog>,
}

/// Whole-document persistence.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Load the current document. A missing document is an empty one.
    async fn load(&self) -> Result<StoreDocument, StoreError>;

    /// Replace the stored document.
    async fn save(&self, document: &StoreDocument) -> Result<(), StoreError>;
}

/// A JSON file on disk. Saves go through a temp file and a rename so a
/// reader never observes a half-written document.
pub struct JsonFileDocument {
    path: PathBuf,
}

impl JsonFileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "db.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentBackend for JsonFileDocument {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreDocument::default());
            }
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn save(&self, document: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create store directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize document: {e}")))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write store file: {e}")))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace store file: {e}")))?;

        debug!(path = %self.path.display(), "Store document saved");
        Ok(())
    }
}

/// An in-process document for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryDocument {
    document: RwLock<StoreDocument>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentBackend for InMemoryDocument {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        Ok(self.document.read().await.clone())
    }

    async fn save(&self, document: &StoreDocument) -> Result<(), StoreError> {
        *self.document.write().await = document.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileDocument::new(dir.path().join("db.json"));
        let doc = backend.load().await.unwrap();
        assert!(doc.messages.is_empty());
        assert!(doc.user_profiles.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_from_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.json");
        let backend = JsonFileDocument::new(&path);

        let mut doc = StoreDocument::default();
        doc.messages.push(Message::user("Logged a run"));
        backend.save(&doc).await.unwrap();

        assert!(path.exists());
        assert!(!backend.temp_path().exists());
        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "Logged a run");
    }

    #[tokio::test]
    async fn layout_uses_camel_case_collections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let backend = JsonFileDocument::new(&path);
        backend.save(&StoreDocument::default()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for key in ["messages", "userProfiles", "interventions", "workoutLogs"] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn older_document_without_workout_logs_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"{"messages":[],"userProfiles":[],"interventions":[]}"#).unwrap();
        let doc = JsonFileDocument::new(&path).load().await.unwrap();
        assert!(doc.workout_logs.is_empty());
    }

    #[tokio::test]
    async fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileDocument::new(&path).load().await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_roundtrip() {
        let backend = InMemoryDocument::new();
        let mut doc = backend.load().await.unwrap();
        doc.messages.push(Message::assistant("Keep going"));
        backend.save(&doc).await.unwrap();
        assert_eq!(backend.load().await.unwrap().messages.len(), 1);
    }
}
