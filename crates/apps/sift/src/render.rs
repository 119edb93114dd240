//! Terminal output

use mail::analysis::TransactionRecord;
use mail::{Label, Message, Profile};

/// Longest body excerpt printed without `--full`
const PREVIEW_CHARS: usize = 160;

pub fn profile(profile: &Profile) {
    println!("Email:    {}", profile.email_address);
    println!("Messages: {}", profile.messages_total);
    println!("Threads:  {}", profile.threads_total);
}

pub fn labels(labels: &[Label]) {
    for label in labels {
        let kind = if label.is_system { "system" } else { "user" };
        println!("{:<8} {:<24} {}", kind, label.id, label.name);
    }
}

pub fn messages(messages: &[Message], full: bool) {
    if messages.is_empty() {
        println!("No messages found");
        return;
    }

    for (i, message) in messages.iter().enumerate() {
        let status = if message.is_read { "read" } else { "UNREAD" };
        println!("{}. [{}] {}", i + 1, status, message.subject);
        println!("   From: {}", message.from);
        println!("   Date: {}", message.date);
        if full {
            println!("{}", message.text());
        } else {
            println!("   {}", preview(message.text()));
        }
        println!();
    }
}

pub fn transactions(records: &[TransactionRecord]) {
    if records.is_empty() {
        println!("No transactions found");
        return;
    }

    let na = "N/A";
    for record in records {
        println!(
            "{:<28} {:>14}  {:<8} {}",
            record.date,
            record.amount.as_deref().unwrap_or(na),
            record.card_type.as_deref().unwrap_or(na),
            record.merchant.as_deref().unwrap_or(na),
        );
    }

    let total: f64 = records.iter().filter_map(|r| r.amount_value).sum();
    println!();
    println!("{} transactions, total S/ {:.2}", records.len(), total);
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}
