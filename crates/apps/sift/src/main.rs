//! sift - Gmail retrieval and card transaction extraction
//!
//! Entry point: parses the command line, sets up logging and dispatches to
//! the command handlers.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::error;
use std::path::PathBuf;

mod commands;
mod render;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Google OAuth client credential file
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Where the OAuth token set is stored
    #[arg(long, global = true)]
    token: Option<PathBuf>,

    /// Do not pause between message fetches
    #[arg(long, global = true)]
    no_delay: bool,

    /// Print the consent URL instead of launching a browser
    #[arg(long, global = true)]
    no_browser: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize sift to read the mailbox
    Auth,
    /// Revoke and delete the stored token
    Logout,
    /// Show the authenticated mailbox profile
    Profile,
    /// List mailbox labels
    Labels,
    /// Search with explicit criteria
    Search(SearchArgs),
    /// Messages from the last few days
    Recent {
        /// Number of days to look back
        #[arg(long, default_value_t = 7)]
        days: u64,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Extract card transactions from bank notifications
    Transactions {
        /// Sender of the notifications
        #[arg(long, default_value = "BCP Notificaciones")]
        from: String,

        /// Subject text of the notifications
        #[arg(long, default_value = "Realizaste un consumo")]
        subject: String,

        /// Only look at the last N days
        #[arg(long)]
        days: Option<u64>,

        /// Maximum number of messages to retrieve
        #[arg(long, default_value_t = 50)]
        max: usize,

        /// Print transactions as JSON
        #[arg(long)]
        json: bool,

        /// Write the batch as JSON (default name in the current directory)
        #[arg(long, num_args = 0..=1, value_name = "PATH")]
        export: Option<Option<PathBuf>>,
    },
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Sender address or name
    #[arg(long)]
    from: Option<String>,

    /// Recipient address
    #[arg(long)]
    to: Option<String>,

    /// Text the subject must contain
    #[arg(long)]
    subject: Option<String>,

    /// Only unread messages
    #[arg(long)]
    unread: bool,

    /// Only messages with attachments
    #[arg(long)]
    has_attachment: bool,

    /// Received after this date (YYYY-MM-DD)
    #[arg(long)]
    after: Option<NaiveDate>,

    /// Received before this date (YYYY-MM-DD)
    #[arg(long)]
    before: Option<NaiveDate>,

    /// Include spam and trash
    #[arg(long)]
    include_spam_trash: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Maximum number of messages to retrieve
    #[arg(long, default_value_t = mail::models::DEFAULT_MAX_RESULTS)]
    max: usize,

    /// Print full bodies instead of snippets
    #[arg(long)]
    full: bool,

    /// Write the batch as JSON (default name in the current directory)
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    export: Option<Option<PathBuf>>,
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = commands::run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
