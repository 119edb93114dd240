//! Configuration loading for mail services
//!
//! Two inputs:
//! 1. The OAuth client configuration, a Google Cloud Console credential file
//!    (`installed` or `web` section). It is provisioned by the operator and
//!    never written by this crate.
//! 2. Runtime [`Settings`] (file locations, scopes, pacing, callback timing),
//!    read from `settings.json` in the sift config directory when present and
//!    overridable through environment variables.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Credentials filename in the sift config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Token filename in the sift config directory
const TOKEN_FILE: &str = "token.json";

/// Settings filename in the sift config directory
const SETTINGS_FILE: &str = "settings.json";

/// Read-only Gmail access
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

/// OAuth client configuration, immutable after load
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub project_id: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
    /// Scopes requested during authorization, in request order
    pub scopes: Vec<String>,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    project_id: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientConfig {
    /// Parse credentials from JSON (Google Cloud Console format)
    ///
    /// The first entry of `redirect_uris` is used as the redirect URI,
    /// defaulting to `http://localhost:8080` when the list is empty.
    pub fn from_json(json: &str, scopes: Vec<String>) -> std::result::Result<Self, String> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;

        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .ok_or_else(|| "missing 'installed' or 'web' section".to_string())?;

        if installed.client_id.trim().is_empty() {
            return Err("client_id is empty".to_string());
        }
        if scopes.is_empty() {
            return Err("no OAuth scopes configured".to_string());
        }

        let redirect_uri = installed
            .redirect_uris
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
            redirect_uri,
            project_id: installed.project_id,
            auth_uri: installed
                .auth_uri
                .unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: installed
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            scopes,
        })
    }

    /// Load credentials from a specific JSON file
    ///
    /// # Errors
    /// [`Error::ConfigMissing`] if the file does not exist,
    /// [`Error::ConfigMalformed`] if it cannot be read or parsed.
    pub fn from_file(path: &Path, scopes: Vec<String>) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigMissing(path.to_path_buf()));
            }
            Err(e) => {
                return Err(Error::ConfigMalformed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        Self::from_json(&content, scopes).map_err(|reason| Error::ConfigMalformed {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Location of the Google credential file
    pub credentials_path: PathBuf,
    /// Location of the persisted token set
    pub token_path: PathBuf,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Delay between consecutive message fetches
    pub fetch_delay_ms: u64,
    /// How long to wait for the browser to complete the consent redirect
    pub callback_timeout_secs: u64,
    /// Time left for the browser to render the confirmation page
    pub callback_grace_ms: u64,
    /// Whether to launch the system browser for consent
    pub open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let base = config::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            credentials_path: base.join(CREDENTIALS_FILE),
            token_path: base.join(TOKEN_FILE),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
            fetch_delay_ms: 100,
            callback_timeout_secs: 300,
            callback_grace_ms: 500,
            open_browser: true,
        }
    }
}

impl Settings {
    /// Load settings using the following priority:
    /// 1. Environment variables (`SIFT_CREDENTIALS_PATH`, `SIFT_TOKEN_PATH`,
    ///    `SIFT_FETCH_DELAY_MS`)
    /// 2. `settings.json` in the sift config directory
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        let settings = match config::config_path(SETTINGS_FILE) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        Ok(settings.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Load settings from a specific JSON file; missing fields take defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path).map_err(|e| Error::ConfigMalformed {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SIFT_CREDENTIALS_PATH") {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("SIFT_TOKEN_PATH") {
            self.token_path = PathBuf::from(path);
        }
        if let Some(delay) = lookup("SIFT_FETCH_DELAY_MS") {
            match delay.parse() {
                Ok(ms) => self.fetch_delay_ms = ms,
                Err(_) => log::warn!("Ignoring invalid SIFT_FETCH_DELAY_MS value: {}", delay),
            }
        }
        self
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn callback_grace(&self) -> Duration {
        Duration::from_millis(self.callback_grace_ms)
    }
}
