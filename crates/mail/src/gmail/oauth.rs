//! OAuth2 provider endpoints
//!
//! Token exchange, refresh, access-token probing and revocation against
//! Google's endpoints. Uses synchronous HTTP (ureq) to be executor-agnostic.
//!
//! Both the provider and the consent step sit behind traits so the
//! authenticator can be exercised without a network or a browser.

use chrono::{Duration, Utc};

use super::api::{ProfileResponse, TokenResponse};
use super::client::{self, GMAIL_API_BASE};
use super::credentials::TokenSet;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::Profile;

/// An authorization code delivered to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    /// The redirect URI the code was issued for (must be echoed on exchange)
    pub redirect_uri: String,
}

/// Obtains an authorization code from the operator
pub trait ConsentFlow: Send + Sync {
    /// Present the consent page and block until a code, an error or a timeout
    fn obtain_code(&self, config: &ClientConfig) -> Result<AuthorizationCode>;
}

/// Token endpoint operations
pub trait OAuthProvider: Send + Sync {
    /// Exchange an authorization code for a token set
    fn exchange_code(&self, config: &ClientConfig, code: &AuthorizationCode) -> Result<TokenSet>;

    /// Obtain a fresh access token from a refresh token
    fn refresh(&self, config: &ClientConfig, refresh_token: &str) -> Result<TokenSet>;

    /// Check that an access token is accepted by the mail API
    ///
    /// Fails with [`Error::Auth`] when the provider rejects the token.
    fn probe(&self, access_token: &str) -> Result<Profile>;

    /// Revoke a token at the provider
    fn revoke(&self, token: &str) -> Result<()>;
}

/// Google OAuth2 endpoints
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    /// Mail API root used to check access tokens
    api_base: String,
}

impl Default for GoogleOAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleOAuth {
    const REVOKE_URL: &'static str = "https://oauth2.googleapis.com/revoke";

    pub fn new() -> Self {
        Self::with_api_base(GMAIL_API_BASE)
    }

    /// Check access tokens against another mail API root
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn post_token_form(
        &self,
        config: &ClientConfig,
        form: &[(&str, &str)],
        context: &str,
    ) -> Result<TokenResponse> {
        let result = ureq::post(&config.token_uri).send_form(form.iter().copied());

        let mut response = match result {
            Ok(response) => response,
            // invalid_grant and invalid_client both come back as 400/401
            Err(ureq::Error::StatusCode(status @ (400 | 401))) => {
                return Err(Error::Auth(format!(
                    "{context}: token endpoint rejected the request (HTTP {status})"
                )));
            }
            Err(e) => return Err(Error::from_http(e, context)),
        };

        response
            .body_mut()
            .read_json::<TokenResponse>()
            .map_err(|e| Error::Transport {
                context: context.to_string(),
                message: format!("failed to parse token response: {e}"),
            })
    }
}

impl OAuthProvider for GoogleOAuth {
    fn exchange_code(&self, config: &ClientConfig, code: &AuthorizationCode) -> Result<TokenSet> {
        log::info!("Exchanging authorization code for tokens");
        let response = self.post_token_form(
            config,
            &[
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("code", code.code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", code.redirect_uri.as_str()),
            ],
            "authorization code exchange",
        )?;
        Ok(token_set_from_response(response, config))
    }

    fn refresh(&self, config: &ClientConfig, refresh_token: &str) -> Result<TokenSet> {
        log::info!("Refreshing access token");
        let mut token = token_set_from_response(
            self.post_token_form(
                config,
                &[
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", config.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ],
                "token refresh",
            )?,
            config,
        );

        // Preserve the refresh token if not returned
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    fn probe(&self, access_token: &str) -> Result<Profile> {
        let url = format!("{}/users/me/profile", self.api_base);
        let profile: ProfileResponse = client::get_json(&url, access_token, "token check")?;
        Ok(profile.into())
    }

    fn revoke(&self, token: &str) -> Result<()> {
        ureq::post(Self::REVOKE_URL)
            .send_form([("token", token)])
            .map_err(|e| Error::from_http(e, "token revocation"))?;
        Ok(())
    }
}

fn token_set_from_response(response: TokenResponse, config: &ClientConfig) -> TokenSet {
    let scopes: Vec<String> = match response.scope.as_deref() {
        Some(scope) if !scope.trim().is_empty() => {
            scope.split_whitespace().map(str::to_string).collect()
        }
        _ => config.scopes.clone(),
    };

    let mut token = TokenSet::new(response.access_token).with_scopes(scopes);
    token.refresh_token = response.refresh_token;
    token.expiry = response
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs as i64));
    token
}

impl From<ProfileResponse> for Profile {
    fn from(p: ProfileResponse) -> Self {
        Profile {
            email_address: p.email_address,
            messages_total: p.messages_total,
            threads_total: p.threads_total,
            history_id: p.history_id,
        }
    }
}

/// Build the consent URL for the authorization code flow
///
/// Requests offline access with a forced consent prompt so Google always
/// issues a refresh token.
pub fn authorization_url(config: &ClientConfig, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
        config.auth_uri,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&config.scopes.join(" ")),
        urlencoding::encode(state),
    )
}

/// Generate an unpredictable anti-forgery state value
pub(crate) fn random_state() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut value = String::with_capacity(32);
    for _ in 0..2 {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u128(Utc::now().timestamp_nanos_opt().unwrap_or_default() as u128);
        value.push_str(&format!("{:016x}", hasher.finish()));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8080".to_string(),
            project_id: None,
            auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/gmail.readonly".to_string(),
                "openid".to_string(),
            ],
        }
    }

    #[test]
    fn test_authorization_url_contains_exact_scopes() {
        let url = authorization_url(&config(), "http://localhost:8080", "abc123");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"));
        assert!(url.contains(
            "scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fgmail.readonly%20openid"
        ));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("state=abc123"));
    }

    #[test]
    fn test_random_state_is_unique() {
        let a = random_state();
        let b = random_state();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_set_from_response() {
        let response = TokenResponse {
            access_token: "ya29".to_string(),
            refresh_token: None,
            expires_in: Some(3599),
            scope: None,
            token_type: Some("Bearer".to_string()),
        };
        let token = token_set_from_response(response, &config());
        assert_eq!(token.access_token, "ya29");
        assert!(!token.can_refresh());
        assert!(token.expiry.is_some());
        assert!(token.scopes.contains("openid"));
    }
}
