//! Command handlers

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use mail::analysis::{self, TransactionRecord};
use mail::export::{ExportRecord, default_export_filename, write_export};
use mail::query::{FetchOutcome, QueryFilter, pacer_for};
use mail::{
    Authenticator, CredentialContext, CredentialStore, GmailClient, GoogleOAuth, LoopbackConsent,
    SearchCriteria, Settings,
};

use crate::render;
use crate::{Cli, Command, OutputArgs, SearchArgs};

/// An opened credential context plus the authenticator driving it
struct Session {
    settings: Settings,
    credentials: Arc<CredentialContext>,
    authenticator: Authenticator,
}

impl Session {
    fn open(settings: Settings) -> Result<Self> {
        let store = CredentialStore::from_settings(&settings);
        let credentials = CredentialContext::open(store, Arc::new(GoogleOAuth::new()))
            .with_context(|| {
                format!(
                    "Could not load Google OAuth credentials. Download an OAuth client \
                     (Desktop app) from Google Cloud Console and save it to {}",
                    settings.credentials_path.display()
                )
            })?;
        let credentials = Arc::new(credentials);
        let consent = Arc::new(LoopbackConsent::from_settings(&settings));
        let authenticator = Authenticator::new(Arc::clone(&credentials), consent);
        Ok(Self {
            settings,
            credentials,
            authenticator,
        })
    }

    /// Authenticate and return a client bound to this session
    fn client(&self) -> Result<GmailClient> {
        self.authenticator
            .authenticate()
            .context("Authentication failed")?;
        Ok(GmailClient::new(Arc::clone(&self.credentials)))
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(path) = &cli.credentials {
        settings.credentials_path = path.clone();
    }
    if let Some(path) = &cli.token {
        settings.token_path = path.clone();
    }
    if cli.no_delay {
        settings.fetch_delay_ms = 0;
    }
    if cli.no_browser {
        settings.open_browser = false;
    }
    Ok(settings)
}

pub fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;

    let session = match Session::open(settings.clone()) {
        Ok(session) => session,
        Err(e) if matches!(cli.command, Command::Logout) => {
            // Without client credentials we can still forget the local token
            warn!("{:#}", e);
            CredentialStore::from_settings(&settings).clear_token()?;
            println!("Logged out");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    match cli.command {
        Command::Auth => {
            let token = session
                .authenticator
                .authenticate()
                .context("Authentication failed")?;
            info!(
                "Authenticated; token stored at {}",
                session.settings.token_path.display()
            );
            if let Some(expiry) = token.expiry {
                println!("Access token valid until {}", expiry.with_timezone(&Local));
            }
            Ok(())
        }
        Command::Logout => {
            session.authenticator.revoke()?;
            println!("Logged out");
            Ok(())
        }
        Command::Profile => {
            let profile = session.client()?.get_profile()?;
            render::profile(&profile);
            Ok(())
        }
        Command::Labels => {
            let labels = session.client()?.list_labels()?;
            render::labels(&labels);
            Ok(())
        }
        Command::Search(args) => {
            let criteria = search_criteria(&args);
            retrieve(&session, criteria, &args.output)
        }
        Command::Recent { days, output } => {
            let criteria = SearchCriteria::last_days(days, Local::now().date_naive());
            retrieve(&session, criteria, &output)
        }
        Command::Transactions {
            from,
            subject,
            days,
            max,
            json,
            export,
        } => {
            let criteria = match days {
                Some(days) => SearchCriteria::last_days(days, Local::now().date_naive()),
                None => SearchCriteria::new(),
            };
            let criteria = criteria
                .sender(from)
                .subject_contains(subject)
                .max_results(max);
            transactions(&session, criteria, json, export.as_ref())
        }
    }
}

fn search_criteria(args: &SearchArgs) -> SearchCriteria {
    let mut criteria = SearchCriteria::new()
        .unread_only(args.unread)
        .has_attachment(args.has_attachment)
        .include_spam_trash(args.include_spam_trash)
        .max_results(args.output.max);
    if let Some(from) = &args.from {
        criteria = criteria.sender(from);
    }
    if let Some(to) = &args.to {
        criteria = criteria.recipient(to);
    }
    if let Some(subject) = &args.subject {
        criteria = criteria.subject_contains(subject);
    }
    if let Some(after) = args.after {
        criteria = criteria.after(after);
    }
    if let Some(before) = args.before {
        criteria = criteria.before(before);
    }
    criteria
}

fn retrieve(session: &Session, criteria: SearchCriteria, output: &OutputArgs) -> Result<()> {
    let criteria = criteria.max_results(output.max);
    let client = session.client()?;
    let filter = QueryFilter::new(&client).with_pacer(pacer_for(session.settings.fetch_delay()));
    let outcome = filter.fetch_matching(&criteria)?;

    render::messages(&outcome.messages, output.full);
    println!();
    summarize(&outcome);
    export_batch(&outcome, output.export.as_ref())
}

/// Print the batch summary and any skipped fetches
fn summarize(outcome: &FetchOutcome) {
    println!("{}", analysis::analyze(&outcome.messages));
    if !outcome.failures.is_empty() {
        println!("Skipped {} messages that could not be fetched", outcome.failures.len());
    }
}

fn export_batch(outcome: &FetchOutcome, export: Option<&Option<PathBuf>>) -> Result<()> {
    let Some(export) = export else {
        return Ok(());
    };
    let path = export
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_export_filename(Local::now())));
    let record = ExportRecord::new(outcome.query.clone(), &outcome.messages, Utc::now());
    write_export(&path, &record)?;
    println!("Exported to {}", path.display());
    Ok(())
}

fn transactions(
    session: &Session,
    criteria: SearchCriteria,
    json: bool,
    export: Option<&Option<PathBuf>>,
) -> Result<()> {
    let registry = analysis::card_transactions()?;
    let client = session.client()?;
    let filter = QueryFilter::new(&client).with_pacer(pacer_for(session.settings.fetch_delay()));
    let outcome = filter.fetch_matching(&criteria)?;

    let records: Vec<TransactionRecord> = outcome
        .messages
        .iter()
        .filter_map(|message| {
            let fields = analysis::extract(message, &registry);
            let record = TransactionRecord::from_message(message, &fields);
            if record.is_none() {
                info!("No transaction found in message {}", message.id);
            }
            record
        })
        .collect();

    if records.len() < outcome.messages.len() {
        warn!(
            "{} of {} messages did not look like a card transaction",
            outcome.messages.len() - records.len(),
            outcome.messages.len()
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        render::transactions(&records);
        println!();
        summarize(&outcome);
    }
    export_batch(&outcome, export)
}
