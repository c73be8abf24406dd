//! Google Drive synchronization layer.
//!
//! This module provides:
//! - A token guard validating the session credential before every operation
//! - An ownership-tagged document gateway over the Drive and Docs APIs
//! - HTTP and in-memory implementations of the remote service
//! - OAuth2 sign-in writing the session store

pub mod auth;
pub mod client;
pub mod document;
pub mod gateway;
pub mod guard;
pub mod memory;
pub mod ownership;
pub mod service;
pub mod session;

pub use auth::{code_from_redirect, sign_out, AuthConfig, AuthManager, TokenGrant};
pub use client::{ApiConfig, GoogleApiClient};
pub use document::{flatten_body, Body, DocsDocument};
pub use gateway::{DocumentContent, DocumentSummary, DriveGateway, RemoteDocument, DEFAULT_TITLE};
pub use guard::TokenGuard;
pub use memory::{MemoryDocumentService, RemoteCall};
pub use ownership::{FileQuery, OwnershipMetadata, DEFAULT_MARKER_KEY, GOOGLE_DOC_MIME_TYPE};
pub use service::{DocsRequest, DocumentService, DriveFile};
pub use session::{
    AccessCredential, CredentialStore, FileSessionStore, Identity, IdentitySource, MemorySession,
    OAuthFlow, SessionState, SessionStore, StoredCredential,
};
