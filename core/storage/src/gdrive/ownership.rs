//! Application-level ownership tags stored in Drive `appProperties`.
//!
//! Drive lets any app with file access read and delete a user's documents.
//! Letterdesk narrows that down: it only touches documents that carry its
//! marker and were created by the acting account.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use letterdesk_common::{DocumentId, Error, OwnershipFailure, Result};

use super::session::AccessCredential;

/// Default `appProperties` key marking a file as created by this application.
pub const DEFAULT_MARKER_KEY: &str = "warrantyMeApp";
/// Key holding the creator's email.
pub const CREATED_BY_KEY: &str = "createdBy";
/// Key holding the creation timestamp (ISO-8601).
pub const CREATED_AT_KEY: &str = "createdAt";
/// Key holding the creator's stable account id.
pub const OWNER_ID_KEY: &str = "userId";

/// MIME type of native Google Docs.
pub const GOOGLE_DOC_MIME_TYPE: &str = "application/vnd.google-apps.document";

/// Ownership tag of a remote document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipMetadata {
    pub app_marker: bool,
    pub created_by_email: Option<String>,
    pub created_at: Option<String>,
    pub owner_account_id: Option<String>,
}

impl OwnershipMetadata {
    /// Tag for a document created now with `credential`.
    pub fn issue(credential: &AccessCredential, now: DateTime<Utc>) -> Self {
        Self {
            app_marker: true,
            created_by_email: Some(credential.account_email.clone()),
            created_at: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            owner_account_id: Some(credential.account_id.clone()),
        }
    }

    /// Read the tag back from a file's `appProperties`.
    ///
    /// Missing properties yield an untagged result rather than an error.
    pub fn from_app_properties(props: Option<&HashMap<String, String>>, marker_key: &str) -> Self {
        let get = |key: &str| props.and_then(|p| p.get(key)).cloned();

        Self {
            app_marker: get(marker_key).as_deref() == Some("true"),
            created_by_email: get(CREATED_BY_KEY),
            created_at: get(CREATED_AT_KEY),
            owner_account_id: get(OWNER_ID_KEY),
        }
    }

    /// Render as `appProperties` entries.
    pub fn to_app_properties(&self, marker_key: &str) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(marker_key.to_string(), self.app_marker.to_string());

        let optional = [
            (CREATED_BY_KEY, &self.created_by_email),
            (CREATED_AT_KEY, &self.created_at),
            (OWNER_ID_KEY, &self.owner_account_id),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                props.insert(key.to_string(), value.clone());
            }
        }

        props
    }

    /// Check the ownership invariant for `acting_email`.
    pub fn check(&self, acting_email: &str) -> std::result::Result<(), OwnershipFailure> {
        if !self.app_marker {
            return Err(OwnershipFailure::MissingMarker);
        }
        if self.created_by_email.as_deref() != Some(acting_email) {
            return Err(OwnershipFailure::ForeignAccount);
        }
        Ok(())
    }

    /// Like [`check`](Self::check), as an `OwnershipViolation` for `document_id`.
    pub fn verify(&self, document_id: &DocumentId, acting_email: &str) -> Result<()> {
        self.check(acting_email).map_err(|reason| {
            warn!(document_id = %document_id, %reason, "Ownership check failed");
            Error::OwnershipViolation {
                document_id: document_id.to_string(),
                reason,
            }
        })
    }
}

/// Structured file listing filter.
///
/// Rendered to Drive query syntax by the HTTP client; evaluated directly by
/// the in-memory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub mime_type: String,
    pub app_properties: Vec<(String, String)>,
}

impl FileQuery {
    /// Google Docs tagged by this application for `email`.
    pub fn owned_documents(marker_key: &str, email: &str) -> Self {
        Self {
            mime_type: GOOGLE_DOC_MIME_TYPE.to_string(),
            app_properties: vec![
                (marker_key.to_string(), "true".to_string()),
                (CREATED_BY_KEY.to_string(), email.to_string()),
            ],
        }
    }

    /// Render as a Drive `q` parameter.
    pub fn to_drive_query(&self) -> String {
        let mut clauses = vec![format!("mimeType='{}'", escape_literal(&self.mime_type))];
        for (key, value) in &self.app_properties {
            clauses.push(format!(
                "appProperties has {{ key='{}' and value='{}' }}",
                escape_literal(key),
                escape_literal(value)
            ));
        }
        clauses.join(" and ")
    }

    /// Whether a file with these attributes satisfies the filter.
    pub fn matches(&self, mime_type: &str, props: &HashMap<String, String>) -> bool {
        mime_type == self.mime_type
            && self
                .app_properties
                .iter()
                .all(|(k, v)| props.get(k).map(|p| p == v).unwrap_or(false))
    }
}

/// Escape a Drive query string literal.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
