//! Common types used throughout Letterdesk.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Identifier assigned by Google to a document (doubles as its Drive file id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new DocumentId from a string.
    ///
    /// Accepts either a bare id or a `docs.google.com/document/d/<id>/...` URL.
    ///
    /// # Errors
    /// - Returns error if no id can be extracted, or the id contains
    ///   whitespace or a path separator
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let raw = id.into();
        let raw = raw.trim();

        let id = match raw.find("/document/d/") {
            Some(start) => {
                let rest = &raw[start + "/document/d/".len()..];
                rest.split(['/', '?', '#']).next().unwrap_or_default()
            }
            None => raw,
        };

        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Document id cannot be empty".to_string(),
            ));
        }
        if id.contains('/') || id.chars().any(char::is_whitespace) {
            return Err(crate::Error::InvalidInput(format!(
                "Invalid document id: {}",
                id
            )));
        }

        Ok(Self(id.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a locally stored draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(String);

impl DraftId {
    /// Wrap an existing draft id.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "Draft id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OAuth bearer token that zeroizes on drop and never prints its value.
#[derive(Clone, PartialEq, Eq, Zeroize, Serialize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token for an `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken([REDACTED; {} chars])", self.0.len())
    }
}
