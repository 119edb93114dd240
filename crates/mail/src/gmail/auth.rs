//! Gmail OAuth2 authentication
//!
//! Drives the authorization code flow for one credential context:
//!
//! ```text
//! Unauthenticated --authenticate()--> AwaitingCallback --code--> Authenticated
//!        ^   \                                  \--error/timeout--> Failed
//!        |    \--stored token probes OK-------------------------> Authenticated
//!        \--stored token rejected (cleared)
//! ```
//!
//! Only one `authenticate()` may be in flight; a concurrent call is rejected
//! rather than opening a second browser window. The public state moves to
//! `AwaitingCallback` only once the consent flow actually starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::context::CredentialContext;
use super::credentials::TokenSet;
use super::oauth::ConsentFlow;
use crate::error::{Error, Result};

/// Authentication progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AwaitingCallback,
    Authenticated,
    Failed,
}

/// OAuth2 authenticator bound to a credential context
pub struct Authenticator {
    credentials: Arc<CredentialContext>,
    consent: Arc<dyn ConsentFlow>,
    state: Mutex<AuthState>,
    in_flight: AtomicBool,
}

/// Releases the in-flight flag when an `authenticate()` call ends
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Authenticator {
    pub fn new(credentials: Arc<CredentialContext>, consent: Arc<dyn ConsentFlow>) -> Self {
        // A stored token is not trusted until authenticate() has probed it
        Self {
            credentials,
            consent,
            state: Mutex::new(AuthState::Unauthenticated),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialContext> {
        &self.credentials
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: AuthState) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        log::debug!("Auth state {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Ensure a working token set exists, running the consent flow if needed
    ///
    /// A stored token that the provider accepts is returned without starting
    /// the browser flow. A rejected token is refreshed once when possible,
    /// otherwise it is cleared and the full flow runs.
    ///
    /// # Errors
    /// [`Error::FlowInProgress`] while another call is still running;
    /// [`Error::Callback`] or [`Error::Auth`] if consent or exchange fail;
    /// non-auth probe failures (network, 5xx) are returned as-is and the
    /// stored token is kept.
    pub fn authenticate(&self) -> Result<TokenSet> {
        let Some(_guard) = FlightGuard::claim(&self.in_flight) else {
            return Err(Error::FlowInProgress);
        };

        match self.try_stored_token() {
            Ok(Some(token)) => {
                self.set_state(AuthState::Authenticated);
                return Ok(token);
            }
            Ok(None) => {}
            Err(e) => {
                self.set_state(AuthState::Unauthenticated);
                return Err(e);
            }
        }

        self.set_state(AuthState::AwaitingCallback);
        match self.run_consent_flow() {
            Ok(token) => {
                self.set_state(AuthState::Authenticated);
                log::info!("Authentication successful");
                Ok(token)
            }
            Err(e) => {
                self.set_state(AuthState::Failed);
                log::warn!("Authentication failed: {}", e);
                Err(e)
            }
        }
    }

    /// Fast path: validate the persisted token with a probe call
    ///
    /// Returns `Ok(None)` when the consent flow has to run.
    fn try_stored_token(&self) -> Result<Option<TokenSet>> {
        let Some(stored) = self.credentials.current_token() else {
            return Ok(None);
        };
        let provider = self.credentials.provider();

        let access_token = match self.credentials.access_token() {
            Ok(token) => token,
            Err(Error::Auth(reason)) => {
                log::info!("Stored token unusable ({}), re-authenticating", reason);
                self.credentials.discard()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match provider.probe(&access_token) {
            Ok(profile) => {
                log::info!("Using stored credentials for {}", profile.email_address);
                return Ok(self.credentials.current_token());
            }
            Err(Error::Auth(_)) if stored.can_refresh() => {
                log::info!("Stored access token rejected, attempting refresh");
            }
            Err(Error::Auth(_)) => {
                log::info!("Stored access token rejected and cannot be refreshed");
                self.credentials.discard()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let refreshed = match self.credentials.refresh_rejected(&access_token) {
            Ok(token) => token,
            Err(Error::Auth(reason)) => {
                log::info!("Refresh rejected ({}), re-authenticating", reason);
                self.credentials.discard()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match provider.probe(&refreshed) {
            Ok(_) => Ok(self.credentials.current_token()),
            Err(Error::Auth(_)) => {
                self.credentials.discard()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn run_consent_flow(&self) -> Result<TokenSet> {
        let config = self.credentials.config();
        let code = self.consent.obtain_code(config)?;
        let token = self.credentials.provider().exchange_code(config, &code)?;
        self.credentials.install(token.clone())?;
        Ok(token)
    }

    /// Revoke the current token at the provider and forget it locally
    ///
    /// Provider-side revocation is best-effort; local credentials are always
    /// cleared.
    pub fn revoke(&self) -> Result<()> {
        if let Some(token) = self.credentials.current_token() {
            // Revoking the refresh token also invalidates its access tokens
            let target = token.refresh_token.as_deref().unwrap_or(&token.access_token);
            if let Err(e) = self.credentials.provider().revoke(target) {
                log::warn!("Token revocation failed, clearing local credentials anyway: {}", e);
            }
        }
        self.credentials.discard()?;
        self.set_state(AuthState::Unauthenticated);
        Ok(())
    }
}
