//! OAuth2 sign-in for the Google Drive and Docs APIs.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use letterdesk_common::{BearerToken, Error, Result};

use super::session::{Identity, OAuthFlow, SessionStore, StoredCredential};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// OpenID Connect userinfo endpoint.
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
/// Redirect URL for the OAuth2 flow (localhost for desktop apps).
const REDIRECT_URL: &str = "http://localhost:8080/callback";

/// Scopes requested at consent: identity plus per-file Drive and Docs access.
pub const SCOPES: [&str; 4] = [
    "openid",
    "email",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/documents",
];

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Configuration for OAuth2 authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URL registered for the OAuth2 client.
    pub redirect_url: String,
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
}

fn default_userinfo_url() -> String {
    GOOGLE_USERINFO_URL.to_string()
}

impl AuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: REDIRECT_URL.to_string(),
            userinfo_url: default_userinfo_url(),
        }
    }

    /// Read `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and the optional
    /// `GOOGLE_REDIRECT_URI` from the environment.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| Error::Config("GOOGLE_CLIENT_ID is not set".to_string()))?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| Error::Config("GOOGLE_CLIENT_SECRET is not set".to_string()))?;

        let mut config = Self::new(client_id, client_secret);
        if let Ok(redirect) = std::env::var("GOOGLE_REDIRECT_URI") {
            config.redirect_url = redirect;
        }
        Ok(config)
    }
}

/// An access token obtained from the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: BearerToken,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

impl UserInfo {
    fn into_identity(self) -> Result<Identity> {
        let email = self
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Authentication("Account has no email address".to_string()))?;
        Ok(Identity::new(email, self.sub))
    }
}

/// OAuth2 sign-in against Google.
///
/// Signing in writes the identity and its token into a [`SessionStore`];
/// nothing else in the Drive layer writes session state.
pub struct AuthManager {
    client: GoogleOAuthClient,
    http: oauth2::reqwest::Client,
    api: reqwest::Client,
    config: AuthConfig,
}

impl AuthManager {
    /// Create a new authentication manager.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            );

        // Token requests must not follow redirects.
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let api = reqwest::Client::builder()
            .user_agent(format!("Letterdesk/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http,
            api,
            config,
        })
    }

    /// Generate the authorization URL for the user to visit.
    ///
    /// Returns the URL and the CSRF state to verify on callback.
    pub fn authorization_url(&self) -> (String, String) {
        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("prompt", "select_account")
            .url();

        (auth_url.to_string(), csrf_token.secret().clone())
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    /// - Invalid or already used authorization code
    /// - Network errors
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let expires_at = token_result
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        Ok(TokenGrant {
            access_token: BearerToken::new(token_result.access_token().secret().clone()),
            expires_at,
        })
    }

    /// Look up the account an access token was issued to.
    pub async fn fetch_identity(&self, token: &BearerToken) -> Result<Identity> {
        debug!("GET {}", self.config.userinfo_url);

        let response = self
            .api
            .get(&self.config.userinfo_url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch user info: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_remote(status.as_u16(), &body));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse user info: {}", e)))?;
        info.into_identity()
    }

    /// Complete the consent flow with `code` and install the session.
    pub async fn sign_in_with_code(&self, store: &dyn SessionStore, code: &str) -> Result<Identity> {
        let grant = self.exchange_code(code).await?;
        let identity = self.fetch_identity(&grant.access_token).await?;

        let mut credential =
            StoredCredential::new(grant.access_token, identity.email.clone(), OAuthFlow::AuthorizationCode);
        credential.expires_at = grant.expires_at;

        store.install(identity.clone(), credential)?;
        info!(email = %identity.email, "Signed in");
        Ok(identity)
    }

    /// Install a token obtained elsewhere, after resolving its owner.
    pub async fn sign_in_with_token(&self, store: &dyn SessionStore, token: &str) -> Result<Identity> {
        let token = BearerToken::new(token.trim());
        if token.is_empty() {
            return Err(Error::InvalidInput("Access token cannot be empty".to_string()));
        }

        let identity = self.fetch_identity(&token).await?;
        let credential = StoredCredential::new(token, identity.email.clone(), OAuthFlow::ProvidedToken);

        store.install(identity.clone(), credential)?;
        info!(email = %identity.email, "Signed in with provided token");
        Ok(identity)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

/// Forget the signed-in identity and its token.
pub fn sign_out(store: &dyn SessionStore) -> Result<()> {
    store.clear()?;
    info!("Signed out");
    Ok(())
}

/// Extract the authorization code from what the user pasted.
///
/// Accepts the full redirect URL (whose `state` must equal `expected_state`)
/// or the bare code.
pub fn code_from_redirect(input: &str, expected_state: &str) -> Result<String> {
    let input = input.trim();
    let url = match Url::parse(input) {
        Ok(url) => url,
        Err(_) if !input.is_empty() => return Ok(input.to_string()),
        Err(_) => {
            return Err(Error::InvalidInput(
                "Authorization code cannot be empty".to_string(),
            ))
        }
    };

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        return Err(Error::Authentication(format!("Consent was not granted: {}", error)));
    }
    if param("state").as_deref() != Some(expected_state) {
        return Err(Error::Authentication(
            "State mismatch in redirect URL".to_string(),
        ));
    }

    param("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::InvalidInput("Redirect URL carries no code".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthManager {
        AuthManager::new(AuthConfig::new("test_id", "test_secret")).unwrap()
    }

    #[test]
    fn test_auth_config_serialization() {
        let config = AuthConfig::new("id", "secret");
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AuthConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.client_id, "id");
        assert_eq!(deserialized.redirect_url, REDIRECT_URL);
        assert_eq!(deserialized.userinfo_url, GOOGLE_USERINFO_URL);
    }

    #[test]
    fn test_invalid_redirect_url() {
        let mut config = AuthConfig::new("id", "secret");
        config.redirect_url = "not a url".to_string();
        assert!(matches!(AuthManager::new(config), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_authorization_url_generation() {
        let (url, csrf_token) = manager().authorization_url();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
        assert!(url.contains("client_id=test_id"));
        assert!(url.contains("drive.file"));
        assert!(url.contains("documents"));
        assert!(url.contains(&format!("state={}", csrf_token)));
        assert!(!csrf_token.is_empty());
    }

    #[test]
    fn test_code_from_redirect_url() {
        let url = "http://localhost:8080/callback?state=abc&code=4%2F0AX&scope=email";
        assert_eq!(code_from_redirect(url, "abc").unwrap(), "4/0AX");
    }

    #[test]
    fn test_code_from_redirect_state_mismatch() {
        let url = "http://localhost:8080/callback?state=evil&code=c";
        assert!(matches!(code_from_redirect(url, "abc"), Err(Error::Authentication(_))));
    }

    #[test]
    fn test_code_from_redirect_denied() {
        let url = "http://localhost:8080/callback?error=access_denied&state=abc";
        match code_from_redirect(url, "abc") {
            Err(Error::Authentication(msg)) => assert!(msg.contains("access_denied")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bare_code() {
        assert_eq!(code_from_redirect("  4/0AXcode \n", "abc").unwrap(), "4/0AXcode");
        assert!(code_from_redirect("   ", "abc").is_err());
    }

    #[test]
    fn test_userinfo_to_identity() {
        let info: UserInfo =
            serde_json::from_str(r#"{"sub": "1234", "email": "a@x.com", "email_verified": true}"#).unwrap();
        assert_eq!(info.into_identity().unwrap(), Identity::new("a@x.com", "1234"));

        let info: UserInfo = serde_json::from_str(r#"{"sub": "1234"}"#).unwrap();
        assert!(matches!(info.into_identity(), Err(Error::Authentication(_))));
    }

    #[test]
    fn test_sign_out_clears_session() {
        use crate::gdrive::session::{CredentialStore, IdentitySource, MemorySession};

        let session = MemorySession::signed_in(Identity::new("a@x.com", "uid"), "tok");
        sign_out(&session).unwrap();

        assert!(session.current_identity().unwrap().is_none());
        assert!(session.load_credential().unwrap().is_none());
    }
}
