//! Session state: the signed-in identity and the stored access credential.
//!
//! The session is the only state the Drive layer reads between calls. It is
//! written by sign-in/sign-out and read by the [`TokenGuard`](super::TokenGuard).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use letterdesk_common::{BearerToken, Error, Result};

/// The account currently signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Email address of the account.
    pub email: String,
    /// Stable account id (the OpenID `sub` claim).
    pub account_id: String,
}

impl Identity {
    pub fn new(email: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            account_id: account_id.into(),
        }
    }
}

/// How an access token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthFlow {
    /// Browser consent + authorization code exchange.
    AuthorizationCode,
    /// Token pasted by the user.
    ProvidedToken,
}

/// Access token as held by the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    /// The bearer token.
    pub access_token: BearerToken,
    /// Email of the account the token was issued to.
    #[serde(default)]
    pub account_email: Option<String>,
    /// How the token was obtained.
    pub issued_via: OAuthFlow,
    /// When the token was stored.
    pub issued_at: DateTime<Utc>,
    /// Expiry reported by the token endpoint, informational only.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCredential {
    pub fn new(access_token: BearerToken, account_email: impl Into<String>, issued_via: OAuthFlow) -> Self {
        Self {
            access_token,
            account_email: Some(account_email.into()),
            issued_via,
            issued_at: Utc::now(),
            expires_at: None,
        }
    }
}

/// A credential that passed the guard and may authorize remote calls.
#[derive(Debug, Clone)]
pub struct AccessCredential {
    pub bearer_token: BearerToken,
    pub account_email: String,
    /// Stable id of the identity the credential was checked against.
    pub account_id: String,
    pub issued_via: OAuthFlow,
}

/// Source of the currently signed-in identity.
pub trait IdentitySource: Send + Sync {
    fn current_identity(&self) -> Result<Option<Identity>>;
}

/// Session-scoped storage of the access token.
pub trait CredentialStore: Send + Sync {
    fn load_credential(&self) -> Result<Option<StoredCredential>>;
}

/// A session store that sign-in and sign-out can write to.
pub trait SessionStore: CredentialStore + IdentitySource {
    /// Install the identity and its credential after a successful sign-in.
    fn install(&self, identity: Identity, credential: StoredCredential) -> Result<()>;

    /// Forget both identity and credential.
    fn clear(&self) -> Result<()>;
}

/// Everything a session store persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub credential: Option<StoredCredential>,
}

/// In-process session, used by tests and embedders that manage sign-in themselves.
#[derive(Debug, Default)]
pub struct MemorySession {
    state: RwLock<SessionState>,
}

impl MemorySession {
    /// Create an empty (signed-out) session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with an identity and a token issued to that identity.
    pub fn signed_in(identity: Identity, token: impl Into<String>) -> Self {
        let credential = StoredCredential::new(
            BearerToken::new(token),
            identity.email.clone(),
            OAuthFlow::AuthorizationCode,
        );
        Self::from_state(SessionState {
            identity: Some(identity),
            credential: Some(credential),
        })
    }

    /// Session from arbitrary state, including inconsistent ones.
    pub fn from_state(state: SessionState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Replace the active identity, keeping the stored credential.
    pub fn switch_identity(&self, identity: Option<Identity>) {
        self.write_state().identity = identity;
    }

    fn read_state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl IdentitySource for MemorySession {
    fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.read_state().identity)
    }
}

impl CredentialStore for MemorySession {
    fn load_credential(&self) -> Result<Option<StoredCredential>> {
        Ok(self.read_state().credential)
    }
}

impl SessionStore for MemorySession {
    fn install(&self, identity: Identity, credential: StoredCredential) -> Result<()> {
        let mut state = self.write_state();
        state.identity = Some(identity);
        state.credential = Some(credential);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.write_state() = SessionState::default();
        Ok(())
    }
}

/// Session persisted as a JSON file, readable only by the current user.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a store backed by `path`. The file is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state; a missing file is an empty session.
    pub fn load(&self) -> Result<SessionState> {
        if !self.path.exists() {
            return Ok(SessionState::default());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::Serialization(format!(
                "Corrupt session file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn persist(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Serialization(format!("Failed to serialize session: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

/// Write `contents` to a fresh file readable only by the owner.
///
/// A leftover file at `path` is removed first so its mode is never reused.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

impl IdentitySource for FileSessionStore {
    fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.load()?.identity)
    }
}

impl CredentialStore for FileSessionStore {
    fn load_credential(&self) -> Result<Option<StoredCredential>> {
        Ok(self.load()?.credential)
    }
}

impl SessionStore for FileSessionStore {
    fn install(&self, identity: Identity, credential: StoredCredential) -> Result<()> {
        tracing::debug!("Installing credential for {}", identity.email);
        self.persist(&SessionState {
            identity: Some(identity),
            credential: Some(credential),
        })
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
