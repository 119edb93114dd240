//! Structured search criteria and their Gmail query rendering
//!
//! Criteria are rendered as Gmail search operators, one clause per field in
//! a fixed order:
//! - `from:sender`
//! - `to:recipient`
//! - `subject:text`
//! - `is:unread`
//! - `has:attachment`
//! - `after:YYYY/MM/DD`
//! - `before:YYYY/MM/DD`

use chrono::{Days, NaiveDate};

use crate::error::{Error, Result};

/// Default number of messages to retrieve per search
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Date format understood by Gmail's `after:`/`before:` operators
const QUERY_DATE_FORMAT: &str = "%Y/%m/%d";

/// Search criteria for one retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject_contains: Option<String>,
    pub unread_only: bool,
    pub has_attachment: bool,
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    pub max_results: usize,
    pub include_spam_trash: bool,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            sender: None,
            recipient: None,
            subject_contains: None,
            unread_only: false,
            has_attachment: false,
            after: None,
            before: None,
            max_results: DEFAULT_MAX_RESULTS,
            include_spam_trash: false,
        }
    }
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received during the last `days` days, relative to `today`
    pub fn last_days(days: u64, today: NaiveDate) -> Self {
        Self {
            after: today.checked_sub_days(Days::new(days)),
            ..Self::default()
        }
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn subject_contains(mut self, text: impl Into<String>) -> Self {
        self.subject_contains = Some(text.into());
        self
    }

    pub fn unread_only(mut self, unread_only: bool) -> Self {
        self.unread_only = unread_only;
        self
    }

    pub fn has_attachment(mut self, has_attachment: bool) -> Self {
        self.has_attachment = has_attachment;
        self
    }

    pub fn after(mut self, date: NaiveDate) -> Self {
        self.after = Some(date);
        self
    }

    pub fn before(mut self, date: NaiveDate) -> Self {
        self.before = Some(date);
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn include_spam_trash(mut self, include: bool) -> Self {
        self.include_spam_trash = include;
        self
    }

    /// Reject criteria that cannot produce a request
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(Error::InvalidCriteria(
                "max_results must be positive".to_string(),
            ));
        }
        if let (Some(after), Some(before)) = (self.after, self.before)
            && after > before
        {
            log::warn!(
                "Search window is empty: after {} is later than before {}",
                after,
                before
            );
        }
        Ok(())
    }

    /// Render the criteria as a Gmail query string
    ///
    /// Pure and order-stable: identical criteria always produce identical
    /// strings. Absent fields contribute no clause.
    pub fn to_query(&self) -> String {
        let mut clauses: Vec<String> = Vec::new();

        if let Some(sender) = non_blank(&self.sender) {
            clauses.push(format!("from:{}", quote_value(sender)));
        }
        if let Some(recipient) = non_blank(&self.recipient) {
            clauses.push(format!("to:{}", quote_value(recipient)));
        }
        if let Some(subject) = non_blank(&self.subject_contains) {
            clauses.push(format!("subject:{}", quote_value(subject)));
        }
        if self.unread_only {
            clauses.push("is:unread".to_string());
        }
        if self.has_attachment {
            clauses.push("has:attachment".to_string());
        }
        if let Some(after) = self.after {
            clauses.push(format!("after:{}", after.format(QUERY_DATE_FORMAT)));
        }
        if let Some(before) = self.before {
            clauses.push(format!("before:{}", before.format(QUERY_DATE_FORMAT)));
        }

        clauses.join(" ")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Wrap multi-word values in quotes so they stay a single clause
fn quote_value(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value.replace('"', ""))
    } else {
        value.to_string()
    }
}
