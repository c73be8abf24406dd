//! Drive document gateway: ownership-protected create/read/update/delete/list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use letterdesk_common::{DocumentId, Result};

use super::document::flatten_body;
use super::guard::TokenGuard;
use super::ownership::{FileQuery, OwnershipMetadata, DEFAULT_MARKER_KEY};
use super::service::{DocsRequest, DocumentService};
use super::session::AccessCredential;

/// Title used when a document is created without one.
pub const DEFAULT_TITLE: &str = "Warranty Letter";

/// A document created by the gateway.
#[derive(Debug, Clone)]
pub struct RemoteDocument {
    pub document_id: DocumentId,
    pub title: String,
    pub web_view_link: Option<String>,
    pub ownership: OwnershipMetadata,
}

/// Title and flattened text of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentContent {
    pub title: String,
    pub content: String,
}

/// One entry returned by [`DriveGateway::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub name: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub web_view_link: Option<String>,
}

/// Gateway to the remote document service.
///
/// Every operation first obtains a credential from the [`TokenGuard`], then
/// runs its remote calls in sequence. Reads and mutations of an existing
/// document are preceded by a fresh ownership check. Failed steps are not
/// rolled back and nothing is retried.
#[derive(Clone)]
pub struct DriveGateway {
    service: Arc<dyn DocumentService>,
    guard: TokenGuard,
    marker_key: String,
}

impl DriveGateway {
    pub fn new(service: Arc<dyn DocumentService>, guard: TokenGuard) -> Self {
        Self {
            service,
            guard,
            marker_key: DEFAULT_MARKER_KEY.to_string(),
        }
    }

    /// Use a different `appProperties` marker key.
    pub fn with_marker_key(mut self, marker_key: impl Into<String>) -> Self {
        self.marker_key = marker_key.into();
        self
    }

    /// Create a tagged document holding `content`.
    ///
    /// Four round trips: create, insert text, tag, fetch share link. A failure
    /// part way leaves the earlier steps in place.
    pub async fn create(&self, title: &str, content: &str) -> Result<RemoteDocument> {
        let auth = self.guard.ensure_valid()?;
        let title = if title.trim().is_empty() {
            DEFAULT_TITLE
        } else {
            title
        };

        let document_id = self.service.create_document(&auth, title).await?;
        debug!(document_id = %document_id, "Created empty document");

        self.service
            .batch_update(&auth, &document_id, &[DocsRequest::insert_at_start(content)])
            .await?;

        let ownership = OwnershipMetadata::issue(&auth, Utc::now());
        self.service
            .set_app_properties(&auth, &document_id, &ownership.to_app_properties(&self.marker_key))
            .await?;

        let link = self
            .service
            .get_file(&auth, &document_id, &["webViewLink"])
            .await?;

        info!(document_id = %document_id, title, "Document created");
        Ok(RemoteDocument {
            document_id,
            title: title.to_string(),
            web_view_link: link.web_view_link,
            ownership,
        })
    }

    /// Read a document's title and flattened text.
    pub async fn read_content(&self, id: &DocumentId) -> Result<DocumentContent> {
        let auth = self.guard.ensure_valid()?;
        let name = self.verify_ownership(&auth, id, &["appProperties", "name"]).await?;

        let document = self.service.get_document(&auth, id).await?;
        let content = document
            .body
            .as_ref()
            .map(flatten_body)
            .unwrap_or_default();

        debug!(document_id = %id, chars = content.len(), "Document read");
        Ok(DocumentContent {
            title: name.unwrap_or(document.title),
            content,
        })
    }

    /// Replace a document's whole body, renaming it first when `new_title`
    /// is non-empty.
    pub async fn update(&self, id: &DocumentId, new_content: &str, new_title: Option<&str>) -> Result<()> {
        let auth = self.guard.ensure_valid()?;
        self.verify_ownership(&auth, id, &["appProperties"]).await?;

        if let Some(title) = new_title.filter(|t| !t.trim().is_empty()) {
            self.service.rename_file(&auth, id, title).await?;
        }

        self.service
            .batch_update(&auth, id, &[DocsRequest::replace_whole_body(new_content)])
            .await?;

        info!(document_id = %id, "Document updated");
        Ok(())
    }

    /// Delete a document the acting account owns.
    pub async fn delete(&self, id: &DocumentId) -> Result<()> {
        let auth = self.guard.ensure_valid()?;
        self.verify_ownership(&auth, id, &["appProperties"]).await?;

        self.service.delete_file(&auth, id).await?;

        info!(document_id = %id, "Document deleted");
        Ok(())
    }

    /// Documents tagged by this application for the acting account.
    ///
    /// Only the first page returned by the service is considered.
    pub async fn list(&self) -> Result<Vec<DocumentSummary>> {
        let auth = self.guard.ensure_valid()?;
        let query = FileQuery::owned_documents(&self.marker_key, &auth.account_email);

        let files = self.service.list_files(&auth, &query).await?;
        let total = files.len();

        let summaries: Vec<DocumentSummary> = files
            .into_iter()
            .filter_map(|file| {
                let tag = OwnershipMetadata::from_app_properties(file.app_properties.as_ref(), &self.marker_key);
                if let Err(reason) = tag.check(&auth.account_email) {
                    warn!(file_id = %file.id, %reason, "Dropping listed file that fails the ownership check");
                    return None;
                }

                let id = match DocumentId::new(file.id.as_str()) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(file_id = %file.id, "Dropping listed file: {}", e);
                        return None;
                    }
                };

                Some(DocumentSummary {
                    id,
                    name: file.name.unwrap_or_default(),
                    modified_time: file.modified_time,
                    web_view_link: file.web_view_link,
                })
            })
            .collect();

        info!(count = summaries.len(), returned = total, "Listed documents");
        Ok(summaries)
    }

    /// Fetch the ownership tag and check it against the acting account.
    /// Returns the file name when it was requested.
    async fn verify_ownership(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        fields: &[&str],
    ) -> Result<Option<String>> {
        let file = self.service.get_file(auth, id, fields).await?;
        OwnershipMetadata::from_app_properties(file.app_properties.as_ref(), &self.marker_key)
            .verify(id, &auth.account_email)?;

        Ok(file.name)
    }
}
