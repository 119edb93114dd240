//! Error taxonomy for the mail crate
//!
//! Errors fall into three groups:
//! - configuration problems the operator must fix (never retried)
//! - credential problems that force re-authentication
//! - remote failures reported per call

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by credential handling, retrieval and decoding.
#[derive(Debug, Error)]
pub enum Error {
    /// The OAuth client configuration file does not exist.
    #[error("client configuration not found at {}", .0.display())]
    ConfigMissing(PathBuf),

    /// The OAuth client configuration file exists but cannot be used.
    #[error("client configuration at {} is malformed: {reason}", path.display())]
    ConfigMalformed { path: PathBuf, reason: String },

    /// The access token is invalid, expired or revoked and could not be renewed.
    #[error("authorization rejected: {0}")]
    Auth(String),

    /// The provider answered with a non-2xx status other than an auth failure.
    #[error("provider returned HTTP {status} for {context}")]
    Remote { status: u16, context: String },

    /// The message no longer resolves (deleted between list and fetch).
    #[error("message {0} not found")]
    NotFound(String),

    /// The OAuth redirect reported an error or never arrived.
    #[error("authorization callback failed: {0}")]
    Callback(String),

    /// `authenticate` was called while another flow awaits its callback.
    #[error("an authorization flow is already in progress")]
    FlowInProgress,

    /// Search criteria that cannot be turned into a request.
    #[error("invalid search criteria: {0}")]
    InvalidCriteria(String),

    /// Network-level failure with no HTTP status (DNS, TLS, reset, bad body).
    #[error("transport failure during {context}: {message}")]
    Transport { context: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for failures that require the operator to re-authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// True when the requested message no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for configuration errors that are fatal at startup.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::ConfigMissing(_) | Error::ConfigMalformed { .. })
    }

    /// Map a ureq failure onto the taxonomy.
    ///
    /// 401 becomes [`Error::Auth`], other statuses [`Error::Remote`]; anything
    /// without a status is a transport failure.
    pub(crate) fn from_http(err: ureq::Error, context: &str) -> Self {
        match err {
            ureq::Error::StatusCode(401) => {
                Error::Auth(format!("{context}: access token rejected"))
            }
            ureq::Error::StatusCode(status) => Error::Remote {
                status,
                context: context.to_string(),
            },
            other => Error::Transport {
                context: context.to_string(),
                message: other.to_string(),
            },
        }
    }
}
