//! Token guard: local validation of the stored access token.

use std::sync::Arc;
use tracing::warn;

use letterdesk_common::{Error, Result};

use super::session::{AccessCredential, CredentialStore, IdentitySource};

/// Checks that a stored token exists and was issued to the active identity.
///
/// The check is local. Whether the remote service still accepts the token
/// is only learned when a call made with it fails.
#[derive(Clone)]
pub struct TokenGuard {
    credentials: Arc<dyn CredentialStore>,
    identity: Arc<dyn IdentitySource>,
}

impl TokenGuard {
    /// Create a guard over explicit collaborators.
    pub fn new(credentials: Arc<dyn CredentialStore>, identity: Arc<dyn IdentitySource>) -> Self {
        Self {
            credentials,
            identity,
        }
    }

    /// Create a guard reading both halves from one session store.
    pub fn from_session<S>(session: Arc<S>) -> Self
    where
        S: CredentialStore + IdentitySource + 'static,
    {
        Self {
            credentials: session.clone(),
            identity: session,
        }
    }

    /// Return a credential that may be used for remote calls.
    ///
    /// # Errors
    /// - `NotSignedIn` when no identity is active
    /// - `CredentialMissing` when no token, or no token owner, is stored
    /// - `CredentialMismatch` when the token belongs to another account
    pub fn ensure_valid(&self) -> Result<AccessCredential> {
        let identity = self.identity.current_identity()?.ok_or(Error::NotSignedIn)?;

        let stored = self
            .credentials
            .load_credential()?
            .filter(|c| !c.access_token.is_empty())
            .ok_or(Error::CredentialMissing)?;

        let stored_email = stored
            .account_email
            .clone()
            .filter(|email| !email.is_empty())
            .ok_or(Error::CredentialMissing)?;

        if stored_email != identity.email {
            warn!(
                stored = %stored_email,
                active = %identity.email,
                "Stored token was issued to a different account"
            );
            return Err(Error::CredentialMismatch {
                stored: stored_email,
                active: identity.email,
            });
        }

        Ok(AccessCredential {
            bearer_token: stored.access_token.clone(),
            account_email: stored_email,
            account_id: identity.account_id,
            issued_via: stored.issued_via,
        })
    }
}
