//! Per-session credential context
//!
//! Holds the client configuration and the current token set for one
//! session and hands out usable access tokens. All refreshes go through the
//! token mutex: the first caller exchanges the refresh token while later
//! callers wait and then reuse its result, so a refresh token is never
//! exchanged twice concurrently.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};

use super::credentials::{CredentialStore, TokenSet};
use super::oauth::OAuthProvider;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

pub struct CredentialContext {
    config: ClientConfig,
    store: CredentialStore,
    provider: Arc<dyn OAuthProvider>,
    tokens: Mutex<Option<TokenSet>>,
}

impl CredentialContext {
    /// Load the client configuration and any persisted token from `store`
    ///
    /// # Errors
    /// Fails with a configuration error if the client configuration is
    /// missing or malformed. A missing token is not an error.
    pub fn open(store: CredentialStore, provider: Arc<dyn OAuthProvider>) -> Result<Self> {
        let config = store.load()?;
        let token = store.load_token()?;
        Ok(Self::with_token(config, store, provider, token))
    }

    /// Build a context from already loaded parts
    pub fn with_token(
        config: ClientConfig,
        store: CredentialStore,
        provider: Arc<dyn OAuthProvider>,
        token: Option<TokenSet>,
    ) -> Self {
        Self {
            config,
            store,
            provider,
            tokens: Mutex::new(token),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn provider(&self) -> &dyn OAuthProvider {
        self.provider.as_ref()
    }

    /// Snapshot of the current token set
    pub fn current_token(&self) -> Option<TokenSet> {
        self.lock().clone()
    }

    /// Persist a newly obtained token set and make it current
    pub fn install(&self, token: TokenSet) -> Result<()> {
        let mut guard = self.lock();
        self.store.save_token(&token)?;
        *guard = Some(token);
        Ok(())
    }

    /// Forget the current token set and remove it from storage
    pub fn discard(&self) -> Result<()> {
        let mut guard = self.lock();
        *guard = None;
        self.store.clear_token()
    }

    /// Return an access token that is not known to be expired
    ///
    /// An expired token is refreshed first when it carries a refresh token.
    ///
    /// # Errors
    /// [`Error::Auth`] if there is no token, or it is expired and cannot be
    /// refreshed.
    pub fn access_token(&self) -> Result<String> {
        let mut guard = self.lock();
        let token = guard
            .as_ref()
            .ok_or_else(|| Error::Auth("not authenticated".to_string()))?;

        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token.clone());
        }

        let refreshed = self.refresh_locked(&mut guard)?;
        Ok(refreshed.access_token)
    }

    /// Refresh after the provider rejected `stale_access_token`
    ///
    /// If another caller already replaced that token while we waited for the
    /// lock, its result is returned without a second exchange.
    pub fn refresh_rejected(&self, stale_access_token: &str) -> Result<String> {
        let mut guard = self.lock();
        match guard.as_ref() {
            Some(current) if current.access_token != stale_access_token => {
                log::debug!("Access token already refreshed by another caller");
                return Ok(current.access_token.clone());
            }
            Some(_) => {}
            None => return Err(Error::Auth("not authenticated".to_string())),
        }

        let refreshed = self.refresh_locked(&mut guard)?;
        Ok(refreshed.access_token)
    }

    fn refresh_locked(&self, guard: &mut MutexGuard<'_, Option<TokenSet>>) -> Result<TokenSet> {
        let Some(current) = guard.as_ref() else {
            return Err(Error::Auth("not authenticated".to_string()));
        };
        let Some(refresh_token) = current
            .refresh_token
            .clone()
            .filter(|_| current.can_refresh())
        else {
            return Err(Error::Auth(
                "access token expired and no refresh token is available".to_string(),
            ));
        };
        let previous_scopes = current.scopes.clone();

        let mut refreshed = self.provider.refresh(&self.config, &refresh_token)?;
        if refreshed.scopes.is_empty() {
            refreshed.scopes = previous_scopes;
        }
        self.store.save_token(&refreshed)?;
        **guard = Some(refreshed.clone());
        Ok(refreshed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<TokenSet>> {
        // A panic while holding the lock cannot leave a half-written token
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
