//! Durable storage for serialized conversation trees.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use loom_common::{ChatSummary, StoreError, UNNAMED_CHAT};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::tree::TreeDocument;

/// Key-value store of tree documents keyed by tree id.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Write `document`, replacing any earlier save with the same id.
    /// Returns where it was written.
    async fn put(&self, document: &TreeDocument) -> Result<String, StoreError>;

    /// Fails with [`StoreError::NotFound`] for an unknown id.
    async fn get(&self, id: &str) -> Result<TreeDocument, StoreError>;

    /// Every stored tree, newest first.
    async fn list(&self) -> Result<Vec<ChatSummary>, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

fn summary(document: &TreeDocument) -> ChatSummary {
    let name = if document.name.trim().is_empty() {
        UNNAMED_CHAT.to_string()
    } else {
        document.name.clone()
    };
    ChatSummary {
        id: document.id.clone(),
        name,
        last_modified: document.last_modified,
    }
}

fn newest_first(summaries: &mut [ChatSummary]) {
    summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
}

/// Ids become file names, so only a conservative character set is accepted.
fn check_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// One `<id>.json` file per tree in a directory.
pub struct FileTreeStore {
    dir: PathBuf,
}

impl FileTreeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        check_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Path of an existing entry. An id that cannot name a file cannot
    /// have been stored, so it reads as not found.
    fn existing_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        self.path_for(id)
            .map_err(|_| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl TreeStore for FileTreeStore {
    async fn put(&self, document: &TreeDocument) -> Result<String, StoreError> {
        let path = self.path_for(&document.id)?;
        let json = document.to_json()?;

        tokio::fs::create_dir_all(&self.dir).await?;
        // Write to a temp file first, then rename for atomicity.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(id = %document.id, path = %path.display(), "tree saved");
        Ok(path.display().to_string())
    }

    async fn get(&self, id: &str) -> Result<TreeDocument, StoreError> {
        let path = self.existing_path(id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        TreeDocument::from_json(&text)
    }

    async fn list(&self) -> Result<Vec<ChatSummary>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(text) => TreeDocument::from_json(&text),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(document) => summaries.push(summary(&document)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable chat file"),
            }
        }

        newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.existing_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile store, for tests and throwaway sessions. Documents are kept
/// serialized, like on disk, so reads never share nested state.
#[derive(Default)]
pub struct MemoryTreeStore {
    documents: RwLock<HashMap<String, (ChatSummary, String)>>,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn put(&self, document: &TreeDocument) -> Result<String, StoreError> {
        check_id(&document.id)?;
        let json = document.to_json()?;
        self.documents
            .write()
            .await
            .insert(document.id.clone(), (summary(document), json));
        Ok(format!("memory:{}", document.id))
    }

    async fn get(&self, id: &str) -> Result<TreeDocument, StoreError> {
        let documents = self.documents.read().await;
        let (_, json) = documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        TreeDocument::from_json(json)
    }

    async fn list(&self) -> Result<Vec<ChatSummary>, StoreError> {
        let mut summaries: Vec<_> = self
            .documents
            .read()
            .await
            .values()
            .map(|(summary, _)| summary.clone())
            .collect();
        newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match self.documents.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use loom_common::Role;

    use super::*;
    use crate::tree::ConversationTree;

    fn document(name: &str, age_minutes: i64) -> TreeDocument {
        let mut tree = ConversationTree::new(Role::System, "S");
        tree.append(Role::User, "Hi");
        let mut document = tree.to_document();
        document.name = name.to_string();
        document.last_modified = Utc::now() - Duration::minutes(age_minutes);
        document
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path());
        let doc = document("first", 0);

        let location = store.put(&doc).await.unwrap();
        assert!(location.ends_with(&format!("{}.json", doc.id)));
        assert_eq!(store.get(&doc.id).await.unwrap(), doc);
        assert!(!dir.path().join(format!("{}.json.tmp", doc.id)).exists());
    }

    #[tokio::test]
    async fn put_overwrites_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path());
        let mut doc = document("before", 0);
        store.put(&doc).await.unwrap();
        doc.name = "after".into();
        store.put(&doc).await.unwrap();

        assert_eq!(store.get(&doc.id).await.unwrap().name, "after");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path());
        assert!(store.get("missing").await.unwrap_err().is_not_found());
        assert!(store.delete("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn path_like_ids_read_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path());
        for id in ["../secrets", "unknown id", ""] {
            assert!(store.get(id).await.unwrap_err().is_not_found(), "get {id:?}");
            assert!(store.delete(id).await.unwrap_err().is_not_found(), "delete {id:?}");
        }

        let mut doc = document("bad", 0);
        doc.id = "../secrets".into();
        let err = store.put(&doc).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_names_unnamed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path());
        store.put(&document("old", 30)).await.unwrap();
        store.put(&document("", 10)).await.unwrap();
        store.put(&document("new", 0)).await.unwrap();

        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["new", UNNAMED_CHAT, "old"]);
    }

    #[tokio::test]
    async fn list_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path());
        store.put(&document("good", 0)).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "good");
    }

    #[tokio::test]
    async fn list_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path().join("not-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTreeStore::new(dir.path());
        let doc = document("gone", 0);
        store.put(&doc).await.unwrap();
        store.delete(&doc.id).await.unwrap();
        assert!(store.get(&doc.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn memory_store_behaves_like_file_store() {
        let store = MemoryTreeStore::new();
        let older = document("older", 5);
        let newer = document("newer", 0);
        store.put(&older).await.unwrap();
        store.put(&newer).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);
        assert_eq!(store.get(&older.id).await.unwrap(), older);
        store.delete(&older.id).await.unwrap();
        assert!(store.get(&older.id).await.unwrap_err().is_not_found());
    }
}
