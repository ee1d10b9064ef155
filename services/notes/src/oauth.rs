//! OAuth2 linking for the Facebook provider
//!
//! Issues the authorization URL (CSRF state is kept in the session),
//! exchanges the callback code, and fetches the provider profile id. Only
//! id and email are consumed; wider profile mapping is out of scope.

use anyhow::Result;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::Deserialize;
use tracing::info;

const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v12.0/dialog/oauth";
const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v12.0/oauth/access_token";
const FACEBOOK_PROFILE_URL: &str = "https://graph.facebook.com/me?fields=id,email";

/// OAuth2 configuration for the Facebook provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Provider profile fields consumed by the linking flow
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProfile {
    pub id: String,
    pub email: Option<String>,
}

impl ProviderProfile {
    /// Profile picture URL derived from the provider id
    pub fn picture_url(&self) -> String {
        format!("https://graph.facebook.com/{}/picture?type=large", self.id)
    }
}

/// Facebook OAuth2 client
#[derive(Clone)]
pub struct FacebookOAuth {
    client: BasicClient,
}

impl FacebookOAuth {
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(FACEBOOK_AUTH_URL.to_string())?,
            Some(TokenUrl::new(FACEBOOK_TOKEN_URL.to_string())?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?);

        Ok(Self { client })
    }

    /// Generate the authorization URL and the CSRF state to stash in the
    /// session
    pub fn authorize_url(&self) -> (String, CsrfToken) {
        let (url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("email".to_string()))
            .url();
        (url.to_string(), csrf_token)
    }

    /// Exchange the callback code for an access token
    pub async fn exchange_code(&self, code: String) -> Result<String> {
        info!("exchanging authorization code with Facebook");
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(oauth2::reqwest::async_http_client)
            .await?;
        Ok(token.access_token().secret().clone())
    }

    /// Fetch the provider profile for an access token
    pub async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile> {
        let response = reqwest::Client::new()
            .get(FACEBOOK_PROFILE_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch provider profile: {}", response.status());
        }

        let profile: ProviderProfile = response.json().await?;
        Ok(profile)
    }
}
