//! Google Drive synchronization and local drafts for Letterdesk.
//!
//! The [`gdrive`] module holds the Drive layer: session state, the token
//! guard, and the ownership-protected document gateway. [`drafts`] keeps
//! letters on disk until they are pushed.
//!
//! # Design Principles
//! - Ownership is re-checked on the remote service before every content call
//! - Remote services sit behind the async [`DocumentService`] trait
//! - Session collaborators are passed explicitly, never global

pub mod config;
pub mod drafts;
pub mod gdrive;

pub use config::{DataPaths, GatewayConfig};
pub use drafts::{Draft, DraftStore};
pub use gdrive::{
    DocumentService, DriveGateway, FileSessionStore, GoogleApiClient, MemoryDocumentService,
    TokenGuard,
};
