//! Common utilities and types shared across Letterdesk crates.
//!
//! This module provides the error taxonomy of the Drive layer and the
//! identifier types used by both the remote and the local stores.

pub mod error;
pub mod types;

pub use error::{Error, GoogleApi, OwnershipFailure, Result};
pub use types::{BearerToken, DocumentId, DraftId};
