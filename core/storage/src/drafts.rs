//! Local draft store.
//!
//! Letters are drafted locally and pushed to Drive on demand. Drafts live in
//! a single JSON file; a missing file is an empty store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use letterdesk_common::{DocumentId, DraftId, Error, Result};

/// Title given to drafts saved without one.
pub const UNTITLED: &str = "Untitled";

/// A locally stored letter draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: DraftId,
    pub title: String,
    /// Letter body (HTML).
    #[serde(default)]
    pub content: String,
    pub last_modified: DateTime<Utc>,
    /// Drive document the draft was last pushed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_file_id: Option<DocumentId>,
}

/// Draft store backed by a JSON file.
pub struct DraftStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    write_lock: Mutex<()>,
}

impl DraftStore {
    /// Create a store backed by `path`. The file is created on first save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All drafts, most recently modified first.
    pub async fn list(&self) -> Result<Vec<Draft>> {
        let mut drafts = self.load().await?;
        drafts.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(drafts)
    }

    /// Get a draft by id.
    ///
    /// # Errors
    /// - `NotFound` if no draft has this id
    pub async fn get(&self, id: &DraftId) -> Result<Draft> {
        self.load()
            .await?
            .into_iter()
            .find(|d| &d.id == id)
            .ok_or_else(|| draft_not_found(id))
    }

    /// Insert or replace a draft.
    ///
    /// Without an id a new draft is created. With an id the draft is replaced
    /// (keeping its Drive link), or inserted under that id if it is unknown.
    /// Empty titles become [`UNTITLED`].
    pub async fn save(&self, id: Option<&DraftId>, title: &str, content: &str) -> Result<Draft> {
        let _guard = self.write_lock.lock().await;
        let mut drafts = self.load().await?;

        let title = if title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            title.to_string()
        };
        let now = Utc::now();

        let draft = match id.and_then(|id| drafts.iter_mut().find(|d| &d.id == id)) {
            Some(existing) => {
                existing.title = title;
                existing.content = content.to_string();
                existing.last_modified = now;
                existing.clone()
            }
            None => {
                let id = match id {
                    Some(id) => id.clone(),
                    None => DraftId::new(Uuid::new_v4().to_string())?,
                };
                let draft = Draft {
                    id,
                    title,
                    content: content.to_string(),
                    last_modified: now,
                    drive_file_id: None,
                };
                drafts.push(draft.clone());
                draft
            }
        };

        self.persist(&drafts).await?;
        debug!(draft_id = %draft.id, "Saved draft");
        Ok(draft)
    }

    /// Delete a draft.
    ///
    /// # Errors
    /// - `NotFound` if no draft has this id
    pub async fn remove(&self, id: &DraftId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut drafts = self.load().await?;

        let before = drafts.len();
        drafts.retain(|d| &d.id != id);
        if drafts.len() == before {
            return Err(draft_not_found(id));
        }

        self.persist(&drafts).await?;
        debug!(draft_id = %id, "Removed draft");
        Ok(())
    }

    /// Record the Drive document a draft was pushed to.
    pub async fn link_drive_file(&self, id: &DraftId, document_id: &DocumentId) -> Result<Draft> {
        let _guard = self.write_lock.lock().await;
        let mut drafts = self.load().await?;

        let draft = drafts
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| draft_not_found(id))?;
        draft.drive_file_id = Some(document_id.clone());
        let linked = draft.clone();

        self.persist(&drafts).await?;
        Ok(linked)
    }

    /// Forget the Drive document a draft was pushed to, so the next push
    /// creates a new one.
    pub async fn unlink_drive_file(&self, id: &DraftId) -> Result<Draft> {
        let _guard = self.write_lock.lock().await;
        let mut drafts = self.load().await?;

        let draft = drafts
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| draft_not_found(id))?;
        let previous = draft.drive_file_id.take();
        let unlinked = draft.clone();

        self.persist(&drafts).await?;
        if let Some(document_id) = previous {
            debug!(draft_id = %id, document_id = %document_id, "Unlinked draft");
        }
        Ok(unlinked)
    }

    async fn load(&self) -> Result<Vec<Draft>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw).map_err(|e| {
            Error::Serialization(format!(
                "Corrupt drafts file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn persist(&self, drafts: &[Draft]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(drafts)
            .map_err(|e| Error::Serialization(format!("Failed to serialize drafts: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn draft_not_found(id: &DraftId) -> Error {
    Error::NotFound(format!("Draft not found: {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> DraftStore {
        DraftStore::new(temp.path().join("drafts.json"))
    }

    #[tokio::test]
    async fn test_empty_store() {
        let temp = TempDir::new().unwrap();
        assert!(store(&temp).list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);

        let saved = drafts.save(None, "Kettle", "<p>Broken</p>").await.unwrap();
        let loaded = drafts.get(&saved.id).await.unwrap();

        assert_eq!(loaded, saved);
        assert_eq!(loaded.content, "<p>Broken</p>");
        assert!(loaded.drive_file_id.is_none());
    }

    #[tokio::test]
    async fn test_empty_title_is_untitled() {
        let temp = TempDir::new().unwrap();
        let saved = store(&temp).save(None, "", "x").await.unwrap();
        assert_eq!(saved.title, UNTITLED);
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);

        let first = drafts.save(None, "v1", "one").await.unwrap();
        let doc = DocumentId::new("doc1").unwrap();
        drafts.link_drive_file(&first.id, &doc).await.unwrap();

        let second = drafts.save(Some(&first.id), "v2", "two").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.title, "v2");
        assert_eq!(second.drive_file_id, Some(doc));
        assert_eq!(drafts.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unlink_clears_drive_file() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);

        let draft = drafts.save(None, "v1", "one").await.unwrap();
        drafts
            .link_drive_file(&draft.id, &DocumentId::new("doc1").unwrap())
            .await
            .unwrap();

        let unlinked = drafts.unlink_drive_file(&draft.id).await.unwrap();
        assert!(unlinked.drive_file_id.is_none());
        assert!(drafts.get(&draft.id).await.unwrap().drive_file_id.is_none());
        assert_eq!(drafts.get(&draft.id).await.unwrap().content, "one");

        let missing = DraftId::new("nope").unwrap();
        assert!(matches!(drafts.unlink_drive_file(&missing).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_with_unknown_id_inserts() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);
        let id = DraftId::new("imported").unwrap();

        drafts.save(Some(&id), "t", "c").await.unwrap();
        assert_eq!(drafts.get(&id).await.unwrap().title, "t");
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);

        let a = drafts.save(None, "a", "").await.unwrap();
        let b = drafts.save(None, "b", "").await.unwrap();
        drafts.save(Some(&a.id), "a2", "").await.unwrap();

        let ids: Vec<_> = drafts.list().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);
        let saved = drafts.save(None, "t", "c").await.unwrap();

        drafts.remove(&saved.id).await.unwrap();
        assert!(matches!(drafts.get(&saved.id).await, Err(Error::NotFound(_))));
        assert!(matches!(drafts.remove(&saved.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let saved = store(&temp).save(None, "t", "c").await.unwrap();

        let reopened = store(&temp);
        assert_eq!(reopened.get(&saved.id).await.unwrap(), saved);
    }

    #[tokio::test]
    async fn test_reads_legacy_records() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);
        std::fs::write(
            drafts.path(),
            r#"[{"id": "1700000000000", "title": "Old", "content": "<p>x</p>", "lastModified": "2024-01-01T00:00:00.000Z"}]"#,
        )
        .unwrap();

        let listed = drafts.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "1700000000000");
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let drafts = store(&temp);
        std::fs::write(drafts.path(), "{").unwrap();

        assert!(matches!(drafts.list().await, Err(Error::Serialization(_))));
    }
}
