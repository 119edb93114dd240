//! Integration tests for the mail crate
//!
//! These tests drive the public API end to end with in-process fakes for the
//! OAuth provider, the consent flow and the mailbox.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::prelude::*;
use chrono::{Duration, TimeZone, Utc};
use mail::analysis::{self, TransactionRecord};
use mail::export::{ExportRecord, write_export};
use mail::gmail::api::GmailMessage;
use mail::gmail::{AuthorizationCode, ConsentFlow, OAuthProvider, normalize_message};
use mail::query::{NoDelay, QueryFilter};
use mail::{
    AuthState, Authenticator, ClientConfig, CredentialContext, CredentialStore, Error, MailApi,
    Message, MessageId, MessagePointer, Profile, Result, SearchCriteria, ThreadId, TokenSet,
};
use tempfile::TempDir;

const CREDENTIALS: &str = r#"{
  "installed": {
    "client_id": "test-client.apps.googleusercontent.com",
    "client_secret": "test-secret",
    "project_id": "sift-test",
    "auth_uri": "https://accounts.google.com/o/oauth2/auth",
    "token_uri": "https://oauth2.googleapis.com/token",
    "redirect_uris": ["http://localhost"]
  }
}"#;

/// Provider accepting a single access token
struct StaticProvider {
    accepted: String,
    probes: AtomicUsize,
}

impl StaticProvider {
    fn new(accepted: &str) -> Self {
        Self {
            accepted: accepted.to_string(),
            probes: AtomicUsize::new(0),
        }
    }
}

impl OAuthProvider for StaticProvider {
    fn exchange_code(&self, _: &ClientConfig, code: &AuthorizationCode) -> Result<TokenSet> {
        Ok(TokenSet::new(format!("exchanged-{}", code.code)))
    }

    fn refresh(&self, _: &ClientConfig, _: &str) -> Result<TokenSet> {
        Err(Error::Auth("invalid_grant".to_string()))
    }

    fn probe(&self, access_token: &str) -> Result<Profile> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if access_token == self.accepted {
            Ok(Profile {
                email_address: "me@example.com".to_string(),
                messages_total: 42,
                threads_total: 40,
                history_id: Some("1".to_string()),
            })
        } else {
            Err(Error::Auth("invalid_token".to_string()))
        }
    }

    fn revoke(&self, _: &str) -> Result<()> {
        Ok(())
    }
}

/// Consent flow that records how often a browser flow would have started
#[derive(Default)]
struct RecordingConsent {
    started: AtomicUsize,
}

impl ConsentFlow for RecordingConsent {
    fn obtain_code(&self, _: &ClientConfig) -> Result<AuthorizationCode> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Err(Error::Callback("timed out waiting for authorization".to_string()))
    }
}

fn store_in(dir: &Path) -> CredentialStore {
    std::fs::write(dir.join("google-credentials.json"), CREDENTIALS).unwrap();
    CredentialStore::new(
        dir.join("google-credentials.json"),
        dir.join("token.json"),
        vec![mail::config::GMAIL_READONLY_SCOPE.to_string()],
    )
}

fn authenticator(
    dir: &TempDir,
    provider: Arc<StaticProvider>,
    consent: Arc<RecordingConsent>,
) -> Authenticator {
    let ctx = CredentialContext::open(store_in(dir.path()), provider).unwrap();
    Authenticator::new(Arc::new(ctx), consent)
}

#[test]
fn test_missing_credentials_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::new(
        dir.path().join("absent.json"),
        dir.path().join("token.json"),
        vec!["s".to_string()],
    );
    let err = CredentialContext::open(store, Arc::new(StaticProvider::new("x")))
        .err()
        .unwrap();
    assert!(err.is_config());
}

#[test]
fn test_valid_persisted_token_starts_no_listener() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    store
        .save_token(
            &TokenSet::new("good")
                .with_refresh_token("r")
                .with_expiry(Utc::now() + Duration::hours(1)),
        )
        .unwrap();

    let provider = Arc::new(StaticProvider::new("good"));
    let consent = Arc::new(RecordingConsent::default());
    let auth = authenticator(&dir, provider.clone(), consent.clone());

    let token = auth.authenticate().unwrap();
    assert_eq!(token.access_token, "good");
    assert_eq!(auth.state(), AuthState::Authenticated);
    assert_eq!(consent.started.load(Ordering::SeqCst), 0);
    assert_eq!(provider.probes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rejected_token_without_refresh_is_cleared() {
    let dir = TempDir::new().unwrap();
    let store = store_in(dir.path());
    store.save_token(&TokenSet::new("revoked")).unwrap();
    assert!(store.token_path().exists());

    let provider = Arc::new(StaticProvider::new("good"));
    let consent = Arc::new(RecordingConsent::default());
    let auth = authenticator(&dir, provider, consent.clone());

    // The consent fake times out, so the flow ends without a token
    let err = auth.authenticate().unwrap_err();
    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(consent.started.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("token.json").exists());
    assert!(auth.credentials().current_token().is_none());

    auth.revoke().unwrap();
    assert_eq!(auth.state(), AuthState::Unauthenticated);
}

/// Mailbox serving canned Gmail API messages
struct CannedMailbox {
    order: Vec<String>,
    messages: HashMap<String, serde_json::Value>,
    fetches: Mutex<Vec<String>>,
}

impl CannedMailbox {
    fn new(raw: &[(&str, Option<serde_json::Value>)]) -> Self {
        let mut order = Vec::new();
        let mut messages = HashMap::new();
        for (id, json) in raw {
            order.push(id.to_string());
            if let Some(json) = json {
                messages.insert(id.to_string(), json.clone());
            }
        }
        Self {
            order,
            messages,
            fetches: Mutex::new(Vec::new()),
        }
    }
}

impl MailApi for CannedMailbox {
    fn list_pointers(&self, _: &str, max_results: usize, _: bool) -> Result<Vec<MessagePointer>> {
        Ok(self
            .order
            .iter()
            .take(max_results)
            .map(|id| MessagePointer::new(id.as_str(), ThreadId::new(id.as_str())))
            .collect())
    }

    fn fetch_full(&self, id: &MessageId) -> Result<Message> {
        self.fetches.lock().unwrap().push(id.to_string());
        let json = self
            .messages
            .get(id.as_str())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let raw: GmailMessage = serde_json::from_value(json.clone())?;
        Ok(normalize_message(raw))
    }
}

fn alert_json(
    id: &str,
    amount: &str,
    merchant: &str,
    date: &str,
    unread: bool,
) -> serde_json::Value {
    let text = format!(
        "Realizaste un consumo de S/ {amount} con tu Tarjeta de Crédito BCP en {merchant}."
    );
    let labels: Vec<&str> = if unread {
        vec!["INBOX", "UNREAD"]
    } else {
        vec!["INBOX"]
    };
    let html = BASE64_URL_SAFE_NO_PAD.encode(format!("<p>{text}</p>"));
    let plain = BASE64_URL_SAFE_NO_PAD.encode(&text);
    serde_json::json!({
        "id": id,
        "threadId": id,
        "labelIds": labels,
        "snippet": text,
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {
                    "name": "Subject",
                    "value": "Realizaste un consumo con tu Tarjeta de Crédito BCP"
                },
                {
                    "name": "From",
                    "value": "BCP Notificaciones <notificaciones@notificacionesbcp.com.pe>"
                },
                {"name": "Date", "value": date}
            ],
            "parts": [
                {
                    "mimeType": "text/html",
                    "body": {"size": 10, "data": html}
                },
                {
                    "mimeType": "text/plain",
                    "body": {"size": 10, "data": plain}
                }
            ]
        }
    })
}

const JUNE_1: &str = "Sat, 1 Jun 2024 09:00:00 -0500";
const JUNE_3: &str = "Mon, 3 Jun 2024 10:00:00 -0500";

#[test]
fn test_partial_batch_skips_missing_message() {
    let mailbox = CannedMailbox::new(&[
        ("1", Some(alert_json("1", "10.00", "TAMBO", JUNE_3, true))),
        ("2", None),
        ("3", Some(alert_json("3", "5.50", "OXXO", JUNE_1, false))),
    ]);
    let filter = QueryFilter::new(&mailbox).with_pacer(Box::new(NoDelay));

    let outcome = filter.fetch_matching(&SearchCriteria::new()).unwrap();
    let ids: Vec<&str> = outcome.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(*mailbox.fetches.lock().unwrap(), vec!["1", "2", "3"]);
}

#[test]
fn test_empty_batch_analysis() {
    let mailbox = CannedMailbox::new(&[]);
    let filter = QueryFilter::new(&mailbox).with_pacer(Box::new(NoDelay));

    let outcome = filter
        .fetch_matching(&SearchCriteria::new().sender("nobody@example.com"))
        .unwrap();
    let summary = analysis::analyze(&outcome.messages);
    assert_eq!(summary.total_count, 0);
    assert!(summary.oldest_date.is_none());
    assert!(summary.newest_date.is_none());
}

#[test]
fn test_transactions_extracted_and_exported() {
    let mailbox = CannedMailbox::new(&[
        ("a", Some(alert_json("a", "25.90", "TAMBO", JUNE_3, true))),
        ("b", Some(alert_json("b", "1,200.00", "SAGA FALABELLA", JUNE_1, false))),
    ]);
    let criteria = SearchCriteria::new()
        .sender("BCP Notificaciones")
        .subject_contains("Realizaste un consumo")
        .max_results(5);
    let outcome = QueryFilter::new(&mailbox)
        .with_pacer(Box::new(NoDelay))
        .fetch_matching(&criteria)
        .unwrap();
    assert_eq!(
        outcome.query,
        r#"from:"BCP Notificaciones" subject:"Realizaste un consumo""#
    );

    // Plain text wins over the html alternative listed first
    assert!(!outcome.messages[0].body.contains("<p>"));

    let registry = analysis::card_transactions().unwrap();
    let records: Vec<TransactionRecord> = outcome
        .messages
        .iter()
        .filter_map(|m| TransactionRecord::from_message(m, &analysis::extract(m, &registry)))
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].merchant.as_deref(), Some("TAMBO"));
    assert_eq!(records[1].amount_value, Some(1200.0));
    assert_eq!(records[1].card_type.as_deref(), Some("Crédito"));

    let summary = analysis::analyze(&outcome.messages);
    assert_eq!(summary.unread_count, 1);
    assert!(summary.oldest_date <= summary.newest_date);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exports").join("batch.json");
    let now = Utc.with_ymd_and_hms(2024, 6, 4, 8, 0, 0).unwrap();
    let record = ExportRecord::new(outcome.query.clone(), &outcome.messages, now);
    write_export(&path, &record).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["totalEmails"], 2);
    assert_eq!(written["messages"][0]["isRead"], false);
    assert_eq!(written["messages"][1]["date"], "2024-06-01T09:00:00-05:00");
}
