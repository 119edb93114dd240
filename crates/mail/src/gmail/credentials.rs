//! Local credential persistence
//!
//! The store owns two files: the externally provisioned client configuration
//! (read-only) and the token set written after every successful exchange or
//! refresh. It keeps no state between calls.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::{ClientConfig, Settings};
use crate::error::{Error, Result};

/// Tokens are treated as expired this long before their actual expiry
const EXPIRY_BUFFER_SECS: i64 = 300;

/// OAuth2 credential bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, alias = "scope", deserialize_with = "scope_set")]
    pub scopes: BTreeSet<String>,
}

impl TokenSet {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry: None,
            scopes: BTreeSet::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the access token should no longer be used at `now`
    ///
    /// A token without an expiry is assumed valid until the provider rejects it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry <= now + Duration::seconds(EXPIRY_BUFFER_SECS))
    }

    /// Whether the token can be renewed without operator interaction
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

/// Accept either a JSON array of scopes or a space-separated string
fn scope_set<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Scopes::deserialize(deserializer)? {
        Scopes::List(list) => list.into_iter().collect(),
        Scopes::Joined(joined) => joined.split_whitespace().map(str::to_string).collect(),
    })
}

/// File-backed store for the client configuration and token set
#[derive(Debug, Clone)]
pub struct CredentialStore {
    config_path: PathBuf,
    token_path: PathBuf,
    scopes: Vec<String>,
}

impl CredentialStore {
    pub fn new(
        config_path: impl Into<PathBuf>,
        token_path: impl Into<PathBuf>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            token_path: token_path.into(),
            scopes,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.credentials_path.clone(),
            settings.token_path.clone(),
            settings.scopes.clone(),
        )
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Load the OAuth client configuration
    pub fn load(&self) -> Result<ClientConfig> {
        ClientConfig::from_file(&self.config_path, self.scopes.clone())
    }

    /// Load the persisted token set, if any
    ///
    /// A missing file means "not yet authenticated". A file that cannot be
    /// parsed is reported and treated the same way.
    pub fn load_token(&self) -> Result<Option<TokenSet>> {
        let content = match std::fs::read_to_string(&self.token_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<TokenSet>(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable token file {}: {}",
                    self.token_path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Persist a token set, replacing any previous one
    pub fn save_token(&self, token: &TokenSet) -> Result<()> {
        config::save_json_file(&self.token_path, token)
            .map_err(|e| Error::Io(std::io::Error::other(format!("{e:#}"))))?;
        log::debug!("Saved token to {}", self.token_path.display());
        Ok(())
    }

    /// Remove the persisted token set; a missing file is not an error
    pub fn clear_token(&self) -> Result<()> {
        let removed = config::remove_file_if_exists(&self.token_path)
            .map_err(|e| Error::Io(std::io::Error::other(format!("{e:#}"))))?;
        if removed {
            log::info!("Cleared stored token at {}", self.token_path.display());
        }
        Ok(())
    }
}
