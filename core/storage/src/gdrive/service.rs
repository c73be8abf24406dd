//! Remote document service seam.
//!
//! One trait method per Drive/Docs round trip the gateway issues. The HTTP
//! client and the in-memory service both implement it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use letterdesk_common::{DocumentId, Result};

use super::document::DocsDocument;
use super::ownership::FileQuery;
use super::session::AccessCredential;

/// Pattern the full-body replace request matches against.
pub const WHOLE_BODY_PATTERN: &str = ".*";

/// Drive file metadata. Which fields are populated depends on the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub app_properties: Option<HashMap<String, String>>,
}

/// Docs `batchUpdate` location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub index: u32,
}

/// Docs `batchUpdate` match criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstringMatchCriteria {
    pub text: String,
    pub match_case: bool,
}

/// One request inside a Docs `batchUpdate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DocsRequest {
    InsertText {
        location: Location,
        text: String,
    },
    ReplaceAllText {
        contains_text: SubstringMatchCriteria,
        replace_text: String,
    },
}

impl DocsRequest {
    /// Insert `text` at the start of the document body (index 1).
    pub fn insert_at_start(text: impl Into<String>) -> Self {
        DocsRequest::InsertText {
            location: Location { index: 1 },
            text: text.into(),
        }
    }

    /// Replace the whole body with `text`.
    pub fn replace_whole_body(text: impl Into<String>) -> Self {
        DocsRequest::ReplaceAllText {
            contains_text: SubstringMatchCriteria {
                text: WHOLE_BODY_PATTERN.to_string(),
                match_case: true,
            },
            replace_text: text.into(),
        }
    }
}

/// Drive and Docs round trips used by the gateway.
///
/// Every call is authorized with the supplied credential. Implementations
/// report non-success responses through `Error::from_remote`.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Service name (e.g., "google", "memory").
    fn name(&self) -> &str;

    /// `POST /documents`: create an empty document.
    async fn create_document(&self, auth: &AccessCredential, title: &str) -> Result<DocumentId>;

    /// `POST /documents/{id}:batchUpdate`.
    async fn batch_update(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        requests: &[DocsRequest],
    ) -> Result<()>;

    /// `PATCH /files/{id}` with `appProperties`.
    async fn set_app_properties(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        properties: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// `PATCH /files/{id}` with a new `name`.
    async fn rename_file(&self, auth: &AccessCredential, id: &DocumentId, name: &str) -> Result<()>;

    /// `GET /files/{id}?fields=...`.
    async fn get_file(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        fields: &[&str],
    ) -> Result<DriveFile>;

    /// `GET /documents/{id}`.
    async fn get_document(&self, auth: &AccessCredential, id: &DocumentId) -> Result<DocsDocument>;

    /// `DELETE /files/{id}`.
    async fn delete_file(&self, auth: &AccessCredential, id: &DocumentId) -> Result<()>;

    /// `GET /files?q=...`: a single page of matching files.
    async fn list_files(&self, auth: &AccessCredential, query: &FileQuery) -> Result<Vec<DriveFile>>;
}
