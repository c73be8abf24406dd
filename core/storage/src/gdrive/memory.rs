//! In-memory document service for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use letterdesk_common::{DocumentId, Error, Result};

use super::document::{Body, DocsDocument};
use super::ownership::{FileQuery, GOOGLE_DOC_MIME_TYPE};
use super::service::{DocsRequest, DocumentService, DriveFile, WHOLE_BODY_PATTERN};
use super::session::AccessCredential;

/// A remote call as seen by the in-memory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateDocument { title: String },
    BatchUpdate { id: String, requests: Vec<DocsRequest> },
    SetAppProperties { id: String, properties: BTreeMap<String, String> },
    RenameFile { id: String, name: String },
    GetFile { id: String, fields: Vec<String> },
    GetDocument { id: String },
    DeleteFile { id: String },
    ListFiles { query: FileQuery },
}

#[derive(Debug, Clone)]
struct StoredFile {
    name: String,
    mime_type: String,
    text: String,
    app_properties: HashMap<String, String>,
    modified: DateTime<Utc>,
}

#[derive(Debug)]
struct PendingFailure {
    skip: usize,
    status: u16,
    body: String,
}

#[derive(Debug, Default)]
struct State {
    files: HashMap<String, StoredFile>,
    calls: Vec<RemoteCall>,
    pending_failure: Option<PendingFailure>,
    revoked_tokens: HashSet<String>,
}

/// In-memory Drive/Docs service.
///
/// Documents are plain text; the Docs body is synthesised one paragraph per
/// line. Every call is recorded, and failures can be injected to exercise
/// error paths.
#[derive(Debug, Default)]
pub struct MemoryDocumentService {
    state: Mutex<State>,
}

impl MemoryDocumentService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a file that was not created through the service.
    pub fn insert_file(
        &self,
        name: &str,
        mime_type: &str,
        text: &str,
        app_properties: &[(&str, &str)],
    ) -> Result<DocumentId> {
        let id = new_file_id();
        let file = StoredFile {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            text: text.to_string(),
            app_properties: app_properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            modified: Utc::now(),
        };
        self.lock().files.insert(id.clone(), file);

        DocumentId::new(id)
    }

    /// Seed a Google Doc.
    pub fn insert_document(
        &self,
        name: &str,
        text: &str,
        app_properties: &[(&str, &str)],
    ) -> Result<DocumentId> {
        self.insert_file(name, GOOGLE_DOC_MIME_TYPE, text, app_properties)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.lock().files.contains_key(id.as_str())
    }

    pub fn document_text(&self, id: &DocumentId) -> Option<String> {
        self.lock().files.get(id.as_str()).map(|f| f.text.clone())
    }

    pub fn file_name(&self, id: &DocumentId) -> Option<String> {
        self.lock().files.get(id.as_str()).map(|f| f.name.clone())
    }

    pub fn app_properties(&self, id: &DocumentId) -> Option<HashMap<String, String>> {
        self.lock()
            .files
            .get(id.as_str())
            .map(|f| f.app_properties.clone())
    }

    /// Number of stored files.
    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call fail with `status` and a raw response `body`.
    pub fn fail_next(&self, status: u16, body: impl Into<String>) {
        self.fail_after(0, status, body);
    }

    /// Let `skip` calls through, then fail the one after with `status`.
    pub fn fail_after(&self, skip: usize, status: u16, body: impl Into<String>) {
        self.lock().pending_failure = Some(PendingFailure {
            skip,
            status,
            body: body.into(),
        });
    }

    /// Reject every later call made with `token` as unauthorized.
    pub fn revoke_token(&self, token: &str) {
        self.lock().revoked_tokens.insert(token.to_string());
    }

    /// Record `call` and check whether it may proceed.
    fn begin(&self, auth: &AccessCredential, call: RemoteCall) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(call);

        if state.revoked_tokens.contains(auth.bearer_token.secret()) {
            return Err(Error::from_remote(
                401,
                &google_error(401, "Request had invalid authentication credentials."),
            ));
        }
        match state.pending_failure.take() {
            Some(mut pending) if pending.skip > 0 => {
                pending.skip -= 1;
                state.pending_failure = Some(pending);
            }
            Some(failure) => return Err(Error::from_remote(failure.status, &failure.body)),
            None => {}
        }

        Ok(state)
    }
}

fn new_file_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn google_error(code: u16, message: &str) -> String {
    serde_json::json!({ "error": { "code": code, "message": message } }).to_string()
}

fn not_found(id: &DocumentId) -> Error {
    Error::from_remote(404, &google_error(404, &format!("File not found: {}.", id)))
}

fn lookup<'a>(state: &'a mut State, id: &DocumentId) -> Result<&'a mut StoredFile> {
    state.files.get_mut(id.as_str()).ok_or_else(|| not_found(id))
}

fn web_view_link(id: &str) -> String {
    format!("https://docs.google.com/document/d/{}/edit", id)
}

/// Apply one Docs request to a plain-text body.
///
/// Index 1 is the first character of the body. Text matching is literal and
/// case-sensitive, except for the whole-body pattern which replaces everything.
fn apply_request(text: &mut String, request: &DocsRequest) -> Result<()> {
    match request {
        DocsRequest::InsertText { location, text: insert } => {
            let char_count = text.chars().count();
            let offset = (location.index as usize)
                .checked_sub(1)
                .filter(|offset| *offset <= char_count)
                .ok_or_else(|| {
                    Error::from_remote(
                        400,
                        &google_error(400, "Invalid requests[0].insertText: Index out of bounds."),
                    )
                })?;
            let byte_offset = text
                .char_indices()
                .nth(offset)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            text.insert_str(byte_offset, insert);
        }
        DocsRequest::ReplaceAllText {
            contains_text,
            replace_text,
        } => {
            if contains_text.text == WHOLE_BODY_PATTERN {
                *text = replace_text.clone();
            } else if !contains_text.text.is_empty() {
                *text = text.replace(&contains_text.text, replace_text);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentService for MemoryDocumentService {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_document(&self, auth: &AccessCredential, title: &str) -> Result<DocumentId> {
        let mut state = self.begin(
            auth,
            RemoteCall::CreateDocument {
                title: title.to_string(),
            },
        )?;

        let id = new_file_id();
        state.files.insert(
            id.clone(),
            StoredFile {
                name: title.to_string(),
                mime_type: GOOGLE_DOC_MIME_TYPE.to_string(),
                text: String::new(),
                app_properties: HashMap::new(),
                modified: Utc::now(),
            },
        );

        DocumentId::new(id)
    }

    async fn batch_update(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        requests: &[DocsRequest],
    ) -> Result<()> {
        let mut state = self.begin(
            auth,
            RemoteCall::BatchUpdate {
                id: id.to_string(),
                requests: requests.to_vec(),
            },
        )?;
        let file = lookup(&mut state, id)?;

        // All or nothing, like the real batchUpdate.
        let mut text = file.text.clone();
        for request in requests {
            apply_request(&mut text, request)?;
        }
        file.text = text;
        file.modified = Utc::now();
        Ok(())
    }

    async fn set_app_properties(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.begin(
            auth,
            RemoteCall::SetAppProperties {
                id: id.to_string(),
                properties: properties.clone(),
            },
        )?;
        let file = lookup(&mut state, id)?;

        file.app_properties
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        file.modified = Utc::now();
        Ok(())
    }

    async fn rename_file(&self, auth: &AccessCredential, id: &DocumentId, name: &str) -> Result<()> {
        let mut state = self.begin(
            auth,
            RemoteCall::RenameFile {
                id: id.to_string(),
                name: name.to_string(),
            },
        )?;
        let file = lookup(&mut state, id)?;

        file.name = name.to_string();
        file.modified = Utc::now();
        Ok(())
    }

    async fn get_file(
        &self,
        auth: &AccessCredential,
        id: &DocumentId,
        fields: &[&str],
    ) -> Result<DriveFile> {
        let mut state = self.begin(
            auth,
            RemoteCall::GetFile {
                id: id.to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        )?;
        let file = lookup(&mut state, id)?;
        let wants = |field: &str| fields.contains(&field);

        Ok(DriveFile {
            id: if wants("id") { id.to_string() } else { String::new() },
            name: wants("name").then(|| file.name.clone()),
            modified_time: wants("modifiedTime").then_some(file.modified),
            web_view_link: wants("webViewLink").then(|| web_view_link(id.as_str())),
            app_properties: (wants("appProperties") && !file.app_properties.is_empty())
                .then(|| file.app_properties.clone()),
        })
    }

    async fn get_document(&self, auth: &AccessCredential, id: &DocumentId) -> Result<DocsDocument> {
        let mut state = self.begin(auth, RemoteCall::GetDocument { id: id.to_string() })?;
        let file = lookup(&mut state, id)?;

        if file.mime_type != GOOGLE_DOC_MIME_TYPE {
            return Err(Error::from_remote(
                400,
                &google_error(400, "This operation is not supported for this document"),
            ));
        }

        Ok(DocsDocument {
            document_id: id.to_string(),
            title: file.name.clone(),
            body: Some(Body::from_text(&file.text)),
        })
    }

    async fn delete_file(&self, auth: &AccessCredential, id: &DocumentId) -> Result<()> {
        let mut state = self.begin(auth, RemoteCall::DeleteFile { id: id.to_string() })?;
        state
            .files
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn list_files(&self, auth: &AccessCredential, query: &FileQuery) -> Result<Vec<DriveFile>> {
        let state = self.begin(
            auth,
            RemoteCall::ListFiles {
                query: query.clone(),
            },
        )?;

        let mut files: Vec<DriveFile> = state
            .files
            .iter()
            .filter(|(_, f)| query.matches(&f.mime_type, &f.app_properties))
            .map(|(id, f)| DriveFile {
                id: id.clone(),
                name: Some(f.name.clone()),
                modified_time: Some(f.modified),
                web_view_link: Some(web_view_link(id)),
                app_properties: Some(f.app_properties.clone()),
            })
            .collect();
        files.sort_by(|a, b| b.modified_time.cmp(&a.modified_time).then_with(|| a.id.cmp(&b.id)));

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdrive::session::OAuthFlow;
    use letterdesk_common::{BearerToken, GoogleApi};

    fn auth(token: &str) -> AccessCredential {
        AccessCredential {
            bearer_token: BearerToken::new(token),
            account_email: "a@x.com".to_string(),
            account_id: "uid-a".to_string(),
            issued_via: OAuthFlow::AuthorizationCode,
        }
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let service = MemoryDocumentService::new();
        let id = service.create_document(&auth("t"), "Letter").await.unwrap();

        service
            .batch_update(&auth("t"), &id, &[DocsRequest::insert_at_start("Line 1\nLine 2")])
            .await
            .unwrap();

        let doc = service.get_document(&auth("t"), &id).await.unwrap();
        assert_eq!(doc.title, "Letter");
        assert_eq!(doc.body.unwrap().content.len(), 2);
        assert_eq!(service.document_text(&id).as_deref(), Some("Line 1\nLine 2"));
    }

    #[tokio::test]
    async fn test_insert_at_index() {
        let service = MemoryDocumentService::new();
        let id = service.insert_document("d", "héllo", &[]).unwrap();

        service
            .batch_update(
                &auth("t"),
                &id,
                &[DocsRequest::InsertText {
                    location: crate::gdrive::service::Location { index: 3 },
                    text: "XY".to_string(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(service.document_text(&id).as_deref(), Some("héXYllo"));
    }

    #[tokio::test]
    async fn test_insert_out_of_bounds_is_atomic() {
        let service = MemoryDocumentService::new();
        let id = service.insert_document("d", "abc", &[]).unwrap();

        let result = service
            .batch_update(
                &auth("t"),
                &id,
                &[
                    DocsRequest::insert_at_start("first "),
                    DocsRequest::InsertText {
                        location: crate::gdrive::service::Location { index: 0 },
                        text: "bad".to_string(),
                    },
                ],
            )
            .await;

        assert!(matches!(result, Err(Error::RemoteService { status: 400, .. })));
        assert_eq!(service.document_text(&id).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_replace_all_text() {
        let service = MemoryDocumentService::new();
        let id = service.insert_document("d", "old old text", &[]).unwrap();

        let literal = DocsRequest::ReplaceAllText {
            contains_text: crate::gdrive::service::SubstringMatchCriteria {
                text: "old".to_string(),
                match_case: true,
            },
            replace_text: "new".to_string(),
        };
        service.batch_update(&auth("t"), &id, &[literal]).await.unwrap();
        assert_eq!(service.document_text(&id).as_deref(), Some("new new text"));

        service
            .batch_update(&auth("t"), &id, &[DocsRequest::replace_whole_body("all gone")])
            .await
            .unwrap();
        assert_eq!(service.document_text(&id).as_deref(), Some("all gone"));
    }

    #[tokio::test]
    async fn test_get_file_respects_fields() {
        let service = MemoryDocumentService::new();
        let id = service.insert_document("Letter", "", &[("warrantyMeApp", "true")]).unwrap();

        let file = service.get_file(&auth("t"), &id, &["appProperties"]).await.unwrap();
        assert!(file.name.is_none());
        assert!(file.web_view_link.is_none());
        assert_eq!(
            file.app_properties.unwrap().get("warrantyMeApp").map(String::as_str),
            Some("true")
        );

        let file = service
            .get_file(&auth("t"), &id, &["id", "webViewLink"])
            .await
            .unwrap();
        assert_eq!(file.id, id.as_str());
        assert!(file.web_view_link.unwrap().contains(id.as_str()));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let service = MemoryDocumentService::new();
        let id = DocumentId::new("nope").unwrap();

        match service.delete_file(&auth("t"), &id).await {
            Err(Error::RemoteService { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("nope"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_document_rejects_non_docs() {
        let service = MemoryDocumentService::new();
        let id = service.insert_file("scan.pdf", "application/pdf", "", &[]).unwrap();

        let result = service.get_document(&auth("t"), &id).await;
        assert!(matches!(result, Err(Error::RemoteService { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_list_filters_by_query() {
        let service = MemoryDocumentService::new();
        let mine = service.insert_document("a", "", &[("warrantyMeApp", "true"), ("createdBy", "a@x.com")]).unwrap();
        service.insert_document("b", "", &[("warrantyMeApp", "true"), ("createdBy", "b@x.com")]).unwrap();
        service.insert_document("c", "", &[]).unwrap();
        service.insert_file("d", "application/pdf", "", &[("warrantyMeApp", "true"), ("createdBy", "a@x.com")]).unwrap();

        let query = FileQuery::owned_documents("warrantyMeApp", "a@x.com");
        let files = service.list_files(&auth("t"), &query).await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, mine.as_str());
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let service = MemoryDocumentService::new();
        service.fail_next(
            403,
            r#"{"error": {"message": "Google Docs API has not been used in project 1 before or it is disabled."}}"#,
        );

        let result = service.create_document(&auth("t"), "x").await;
        assert!(matches!(
            result,
            Err(Error::ApiDisabled {
                api: GoogleApi::Docs,
                ..
            })
        ));
        assert_eq!(service.file_count(), 0);

        assert!(service.create_document(&auth("t"), "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_revoked_token() {
        let service = MemoryDocumentService::new();
        service.revoke_token("old");

        let err = service.create_document(&auth("old"), "x").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(service.create_document(&auth("new"), "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_call_log() {
        let service = MemoryDocumentService::new();
        let id = service.create_document(&auth("t"), "x").await.unwrap();
        service.get_document(&auth("t"), &id).await.unwrap();

        let calls = service.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], RemoteCall::CreateDocument { title } if title == "x"));
        assert!(matches!(&calls[1], RemoteCall::GetDocument { id: got } if got == id.as_str()));

        service.clear_calls();
        assert!(service.calls().is_empty());
    }
}
