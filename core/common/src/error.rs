//! Common error types for Letterdesk.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message fragments Google uses when an API is switched off for the project.
const API_DISABLED_MARKERS: [&str; 2] = ["API has not been used", "it is disabled"];

/// The two Google APIs the Drive layer depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoogleApi {
    Drive,
    Docs,
}

impl GoogleApi {
    /// Service host as it appears in Google error messages.
    pub fn host(&self) -> &'static str {
        match self {
            GoogleApi::Drive => "drive.googleapis.com",
            GoogleApi::Docs => "docs.googleapis.com",
        }
    }

    /// Cloud console page where the API can be enabled.
    pub fn console_url(&self) -> String {
        format!(
            "https://console.developers.google.com/apis/api/{}/overview",
            self.host()
        )
    }
}

impl fmt::Display for GoogleApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoogleApi::Drive => write!(f, "Drive"),
            GoogleApi::Docs => write!(f, "Docs"),
        }
    }
}

/// Why a remote file failed the ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipFailure {
    /// The file carries no application marker.
    MissingMarker,
    /// The file was created by a different account.
    ForeignAccount,
}

impl fmt::Display for OwnershipFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipFailure::MissingMarker => write!(f, "file was not created by Letterdesk"),
            OwnershipFailure::ForeignAccount => {
                write!(f, "file belongs to a different account")
            }
        }
    }
}

/// Top-level error type for Letterdesk operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No account is signed in.
    #[error("Not signed in")]
    NotSignedIn,

    /// The session holds no access token for the signed-in account.
    #[error("No stored Google access token for the signed-in account")]
    CredentialMissing,

    /// The stored access token was issued to another account.
    #[error("Stored access token belongs to {stored}, but {active} is signed in")]
    CredentialMismatch { stored: String, active: String },

    /// The remote file failed the application-level ownership check.
    #[error("Unauthorized access to {document_id}: {reason}")]
    OwnershipViolation {
        document_id: String,
        reason: OwnershipFailure,
    },

    /// The remote service answered with a non-success status.
    #[error("Remote service error ({status}): {message}")]
    RemoteService { status: u16, message: String },

    /// A required Google API is not enabled for the OAuth project.
    #[error("Google {api} API is not enabled: {message}")]
    ApiDisabled { api: GoogleApi, message: String },

    /// The request never produced an HTTP status.
    #[error("Network error: {0}")]
    Network(String),

    /// OAuth sign-in failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration could not be resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify a non-success response from a Google API.
    ///
    /// `body` is the raw response text. Google wraps failures as
    /// `{"error": {"code": .., "message": ..}}`; anything else is used verbatim.
    pub fn from_remote(status: u16, body: &str) -> Self {
        let message = remote_message(body);

        if API_DISABLED_MARKERS.iter().any(|m| message.contains(m)) {
            let api = if message.contains(GoogleApi::Drive.host()) {
                GoogleApi::Drive
            } else {
                GoogleApi::Docs
            };
            return Error::ApiDisabled { api, message };
        }

        Error::RemoteService { status, message }
    }

    /// Whether the remote service rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::RemoteService { status: 401, .. })
    }

    /// Actionable instructions for the user, when there are any.
    pub fn remediation(&self) -> Option<String> {
        match self {
            Error::ApiDisabled { .. } => Some(format!(
                "Enable both APIs in the Google Cloud Console, then wait a few minutes:\n\
                 1. Google Drive API: {}\n\
                 2. Google Docs API: {}",
                GoogleApi::Drive.console_url(),
                GoogleApi::Docs.console_url()
            )),
            Error::NotSignedIn | Error::CredentialMissing | Error::CredentialMismatch { .. } => {
                Some("Sign in again with `letterdesk login`.".to_string())
            }
            e if e.is_unauthorized() => Some(
                "The access token was rejected or has expired. Sign in again with `letterdesk login`."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Extract the human-readable message from a Google error body.
fn remote_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error").and_then(|e| match e {
                serde_json::Value::String(s) => Some(s.clone()),
                other => other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
            })
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "Unknown error".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_drive_disabled_detected() {
        let body = r#"{"error":{"code":403,"message":"Google Drive API has not been used in project 42 before or it is disabled. Enable it by visiting https://console.developers.google.com/apis/api/drive.googleapis.com/overview?project=42"}}"#;

        match Error::from_remote(403, body) {
            Error::ApiDisabled { api, .. } => assert_eq!(api, GoogleApi::Drive),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_docs_disabled_detected() {
        let body = r#"{"error":{"code":403,"message":"Google Docs API has not been used in project 42 before. Visit https://console.developers.google.com/apis/api/docs.googleapis.com/overview"}}"#;

        match Error::from_remote(403, body) {
            Error::ApiDisabled { api, .. } => assert_eq!(api, GoogleApi::Docs),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_generic_remote_error() {
        let body = r#"{"error":{"code":404,"message":"File not found: abc"}}"#;
        match Error::from_remote(404, body) {
            Error::RemoteService { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "File not found: abc");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_json_body_kept_verbatim() {
        match Error::from_remote(502, "  Bad Gateway \n") {
            Error::RemoteService { message, .. } => assert_eq!(message, "Bad Gateway"),
            other => panic!("unexpected error: {other:?}"),
        }
        match Error::from_remote(500, "") {
            Error::RemoteService { message, .. } => assert_eq!(message, "Unknown error"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_remediation() {
        let disabled = Error::ApiDisabled {
            api: GoogleApi::Docs,
            message: "x".to_string(),
        };
        let text = disabled.remediation().unwrap();
        assert!(text.contains("drive.googleapis.com"));
        assert!(text.contains("docs.googleapis.com"));

        let expired = Error::from_remote(401, "Invalid Credentials");
        assert!(expired.is_unauthorized());
        assert!(expired.remediation().unwrap().contains("login"));

        assert!(Error::NotFound("draft".to_string()).remediation().is_none());
    }

    proptest! {
        #[test]
        fn prop_disabled_marker_always_classified(prefix in ".{0,40}", suffix in ".{0,40}") {
            let message = format!("{}API has not been used{}", prefix, suffix);
            let body = serde_json::json!({"error": {"code": 403, "message": message}}).to_string();
            let is_disabled = matches!(Error::from_remote(403, &body), Error::ApiDisabled { .. });
            prop_assert!(is_disabled);
        }

        #[test]
        fn prop_status_preserved(status in 400u16..600, text in "[a-zA-Z ]{1,40}") {
            prop_assume!(API_DISABLED_MARKERS.iter().all(|m| !text.contains(m)));
            let body = serde_json::json!({"error": {"message": text}}).to_string();
            match Error::from_remote(status, &body) {
                Error::RemoteService { status: s, .. } => prop_assert_eq!(s, status),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
