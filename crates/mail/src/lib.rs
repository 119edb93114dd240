//! Mail crate - Gmail retrieval and analysis for sift
//!
//! This crate provides:
//! - OAuth2 authentication with a loopback redirect listener
//! - Persisted credentials with serialized token refresh
//! - Gmail API client and MIME body decoding
//! - Criteria-driven batch retrieval with request pacing
//! - Field extraction, batch analysis and JSON export
//!
//! All I/O is synchronous so callers can use it from any executor.

pub mod analysis;
pub mod config;
pub mod error;
pub mod export;
pub mod gmail;
pub mod models;
pub mod query;

pub use analysis::{BatchAnalysis, ExtractedFields, Extractor, ExtractorRegistry, analyze, extract};
pub use config::{ClientConfig, Settings};
pub use error::{Error, Result};
pub use export::{ExportRecord, default_export_filename, write_export};
pub use gmail::{
    AuthState, Authenticator, CredentialContext, CredentialStore, GmailClient, GoogleOAuth,
    LoopbackConsent, MailApi, TokenSet,
};
pub use models::{Label, Message, MessageId, MessagePointer, Profile, SearchCriteria, ThreadId};
pub use query::{FetchOutcome, QueryFilter};
