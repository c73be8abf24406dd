//! HTTP client for the Google Drive v3 and Docs v1 REST APIs.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use letterdesk_common::{DocumentId, Error, Result};

use super::document::DocsDocument;
use super::ownership::FileQuery;
use super::service::{DocsRequest, DocumentService, DriveFile};
use super::session::AccessCredential;

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Docs API base URL.
pub const DOCS_API_BASE: &str = "https://docs.googleapis.com/v1";

/// Characters left untouched when an id is placed in a URL path.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Endpoint and transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub drive_api_base: String,
    pub docs_api_base: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            drive_api_base: DRIVE_API_BASE.to_string(),
            docs_api_base: DOCS_API_BASE.to_string(),
            user_agent: format!("Letterdesk/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Defaults, with base URLs overridable through
    /// `LETTERDESK_DRIVE_API` and `LETTERDESK_DOCS_API`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("LETTERDESK_DRIVE_API") {
            config.drive_api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(base) = std::env::var("LETTERDESK_DOCS_API") {
            config.docs_api_base = base.trim_end_matches('/').to_string();
        }
        config
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDocument {
    document_id: String,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// [`DocumentService`] backed by the Google REST APIs.
pub struct GoogleApiClient {
    http: Client,
    config: ApiConfig,
}

impl GoogleApiClient {
    /// Create a client with the given endpoints.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Create a client against the production endpoints.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ApiConfig::default())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn file_url(&self, id: &DocumentId) -> String {
        format!("{}/files/{}", self.config.drive_api_base, encode_segment(id.as_str()))
    }

    fn document_url(&self, id: &DocumentId) -> String {
        format!("{}/documents/{}", self.config.docs_api_base, encode_segment(id.as_str()))
    }

    /// Send an authorized request and map failures onto the error taxonomy.
    async fn send(
        &self,
        request: RequestBuilder,
        auth: &AccessCredential,
        action: &str,
    ) -> Result<Response> {
        let response = request
            .bearer_auth(auth.bearer_token.secret())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to {}: {}", action, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = Error::from_remote(status.as_u16(), &body);
        warn!(status = status.as_u16(), action, "Google API call failed: {}", error);
        Err(error)
    }

    async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse {} response: {}", action, e)))
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

#[async_trait]
impl DocumentService for GoogleApiClient {
    fn name(&self) -> &str {
        "google"
    }

    async fn create_document(&self, auth: &AccessCredential, title: &str) -> Result<DocumentId> {
        let url = format!("{}/documents", self.config.docs_api_base);
        debug!(title, "POST {}", url);

        let request = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "title": title }));
        let response = self.send(request, auth, "create document").await?;
        let created: CreatedDocument = Self::parse(response, "create document").await?;

        DocumentId::new(created.document_id)
    }

    async fn batch_update(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        requests: &[DocsRequest],
    ) -> Result<()> {
        let url = format!("{}:batchUpdate", self.document_url(id));
        debug!(requests = requests.len(), "POST {}", url);

        let request = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "requests": requests }));
        self.send(request, auth, "update document").await?;
        Ok(())
    }

    async fn set_app_properties(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let url = self.file_url(id);
        debug!("PATCH {} (appProperties)", url);

        let request = self
            .http
            .patch(&url)
            .json(&serde_json::json!({ "appProperties": properties }));
        self.send(request, auth, "tag file").await?;
        Ok(())
    }

    async fn rename_file(&self, auth: &AccessCredential, id: &DocumentId, name: &str) -> Result<()> {
        let url = self.file_url(id);
        debug!("PATCH {} (name)", url);

        let request = self
            .http
            .patch(&url)
            .json(&serde_json::json!({ "name": name }));
        self.send(request, auth, "rename file").await?;
        Ok(())
    }

    async fn get_file(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        fields: &[&str],
    ) -> Result<DriveFile> {
        let url = self.file_url(id);
        let fields = fields.join(",");
        debug!(fields = %fields, "GET {}", url);

        let request = self.http.get(&url).query(&[("fields", fields.as_str())]);
        let response = self.send(request, auth, "get file metadata").await?;
        Self::parse(response, "file metadata").await
    }

    async fn get_document(&self, auth: &AccessCredential, id: &DocumentId) -> Result<DocsDocument> {
        let url = self.document_url(id);
        debug!("GET {}", url);

        let response = self.send(self.http.get(&url), auth, "read document").await?;
        Self::parse(response, "document").await
    }

    async fn delete_file(&self, auth: &AccessCredential, id: &DocumentId) -> Result<()> {
        let url = self.file_url(id);
        debug!("DELETE {}", url);

        self.send(self.http.delete(&url), auth, "delete file").await?;
        Ok(())
    }

    async fn list_files(&self, auth: &AccessCredential, query: &FileQuery) -> Result<Vec<DriveFile>> {
        let url = format!("{}/files", self.config.drive_api_base);
        let q = query.to_drive_query();
        debug!(q = %q, "GET {}", url);

        let request = self.http.get(&url).query(&[
            ("q", q.as_str()),
            (
                "fields",
                "files(id,name,modifiedTime,webViewLink,appProperties)",
            ),
        ]);
        let response = self.send(request, auth, "list files").await?;
        let list: FileListResponse = Self::parse(response, "file list").await?;

        Ok(list.files)
    }
}
