//! Batch summaries

use chrono::{DateTime, FixedOffset};
use std::fmt;

use crate::models::Message;

/// Summary of a retrieved batch
///
/// `None` dates mean no message in the batch had a parseable date.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAnalysis<'a> {
    pub total_count: usize,
    pub oldest_date: Option<DateTime<FixedOffset>>,
    pub newest_date: Option<DateTime<FixedOffset>>,
    pub unread_count: usize,
    pub messages: &'a [Message],
}

impl BatchAnalysis<'_> {
    pub fn read_count(&self) -> usize {
        self.total_count - self.unread_count
    }
}

/// Summarize a batch of messages
pub fn analyze(messages: &[Message]) -> BatchAnalysis<'_> {
    let mut oldest: Option<DateTime<FixedOffset>> = None;
    let mut newest: Option<DateTime<FixedOffset>> = None;

    for date in messages.iter().filter_map(|m| parse_message_date(&m.date)) {
        if oldest.is_none_or(|o| date < o) {
            oldest = Some(date);
        }
        if newest.is_none_or(|n| date > n) {
            newest = Some(date);
        }
    }

    BatchAnalysis {
        total_count: messages.len(),
        oldest_date: oldest,
        newest_date: newest,
        unread_count: messages.iter().filter(|m| !m.is_read).count(),
        messages,
    }
}

/// Parse a message date as RFC 3339, falling back to RFC 2822
pub fn parse_message_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
}

impl fmt::Display for BatchAnalysis<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |d: Option<DateTime<FixedOffset>>| {
            d.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "N/A".to_string())
        };
        writeln!(f, "Total messages: {}", self.total_count)?;
        writeln!(f, "Unread: {}", self.unread_count)?;
        writeln!(f, "Oldest: {}", render(self.oldest_date))?;
        write!(f, "Newest: {}", render(self.newest_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, ThreadId};

    fn message(id: &str, date: &str, unread: bool) -> Message {
        let labels: Vec<&str> = if unread { vec!["INBOX", "UNREAD"] } else { vec!["INBOX"] };
        Message::builder(MessageId::new(id), ThreadId::new(id))
            .date(date)
            .labels(labels)
            .build()
    }

    #[test]
    fn test_empty_batch_sentinels() {
        let analysis = analyze(&[]);
        assert_eq!(analysis.total_count, 0);
        assert_eq!(analysis.unread_count, 0);
        assert!(analysis.oldest_date.is_none());
        assert!(analysis.newest_date.is_none());
        assert!(analysis.to_string().contains("Oldest: N/A"));
    }

    #[test]
    fn test_counts_and_range() {
        let messages = vec![
            message("a", "2024-06-03T10:00:00+00:00", true),
            message("b", "Sat, 1 Jun 2024 09:30:00 -0500", false),
            message("c", "2024-06-02T08:00:00-05:00", true),
        ];
        let analysis = analyze(&messages);

        assert_eq!(analysis.total_count, 3);
        assert_eq!(analysis.unread_count, 2);
        assert_eq!(analysis.read_count(), 1);
        let oldest = analysis.oldest_date.unwrap();
        let newest = analysis.newest_date.unwrap();
        assert!(oldest <= newest);
        assert_eq!(oldest.to_rfc3339(), "2024-06-01T09:30:00-05:00");
        assert_eq!(newest.to_rfc3339(), "2024-06-03T10:00:00+00:00");
    }

    #[test]
    fn test_unparseable_dates_ignored() {
        let messages = vec![
            message("a", "not a date", false),
            message("b", "2024-06-02T08:00:00+00:00", false),
        ];
        let analysis = analyze(&messages);
        assert_eq!(analysis.total_count, 2);
        assert_eq!(analysis.oldest_date, analysis.newest_date);
        assert!(analysis.oldest_date.is_some());
    }
}
