//! Filtered batch retrieval

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::pacing::{FixedDelay, Pacer};
use crate::error::{Error, Result};
use crate::gmail::MailApi;
use crate::models::{Message, MessageId, SearchCriteria};

/// A message that was listed but could not be materialized
#[derive(Debug)]
pub struct FetchFailure {
    pub id: MessageId,
    pub error: Error,
}

/// Result of one filtered retrieval
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Query string sent to the provider
    pub query: String,
    /// Successfully fetched messages, in provider order
    pub messages: Vec<Message>,
    /// Per-message failures excluded from `messages`
    pub failures: Vec<FetchFailure>,
    /// Number of pointers the listing returned
    pub listed: usize,
    /// Whether the batch stopped early on request
    pub cancelled: bool,
}

impl FetchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() || self.cancelled
    }
}

/// Retrieves messages matching [`SearchCriteria`] through a [`MailApi`]
pub struct QueryFilter<'a> {
    api: &'a dyn MailApi,
    pacer: Box<dyn Pacer>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> QueryFilter<'a> {
    /// Filter with the default fixed pacing
    pub fn new(api: &'a dyn MailApi) -> Self {
        Self {
            api,
            pacer: Box::new(FixedDelay::default()),
            cancel: None,
        }
    }

    pub fn with_pacer(mut self, pacer: Box<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Stop between messages once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// List and fetch every message matching `criteria`
    ///
    /// Messages come back in the provider's order. A message that fails to
    /// fetch is logged, recorded in [`FetchOutcome::failures`] and skipped;
    /// the rest of the batch continues.
    ///
    /// # Errors
    /// [`Error::InvalidCriteria`] before any request if the criteria are
    /// unusable; listing failures (auth, remote, transport) propagate.
    pub fn fetch_matching(&self, criteria: &SearchCriteria) -> Result<FetchOutcome> {
        criteria.validate()?;
        let query = criteria.to_query();
        log::info!("Searching with query: {:?}", query);

        let pointers =
            self.api
                .list_pointers(&query, criteria.max_results, criteria.include_spam_trash)?;

        let mut outcome = FetchOutcome {
            query,
            listed: pointers.len(),
            ..FetchOutcome::default()
        };

        if pointers.is_empty() {
            log::info!("No messages matched");
            return Ok(outcome);
        }

        for pointer in pointers {
            if self.is_cancelled() {
                log::info!(
                    "Retrieval cancelled after {} of {} messages",
                    outcome.messages.len() + outcome.failures.len(),
                    outcome.listed
                );
                outcome.cancelled = true;
                break;
            }

            self.pacer.pause();
            match self.api.fetch_full(&pointer.id) {
                Ok(message) => outcome.messages.push(message),
                Err(error) => {
                    log::warn!("Failed to fetch message {}: {}", pointer.id, error);
                    outcome.failures.push(FetchFailure {
                        id: pointer.id,
                        error,
                    });
                }
            }
        }

        log::info!(
            "Retrieved {} of {} messages ({} failed)",
            outcome.messages.len(),
            outcome.listed,
            outcome.failures.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessagePointer, ThreadId};
    use crate::query::NoDelay;
    use std::sync::Mutex;

    /// Mailbox fake that records every call
    #[derive(Default)]
    struct FakeMailbox {
        ids: Vec<&'static str>,
        missing: Vec<&'static str>,
        queries: Mutex<Vec<String>>,
        fetched: Mutex<Vec<String>>,
        cancel_after_first: Option<Arc<AtomicBool>>,
    }

    impl MailApi for FakeMailbox {
        fn list_pointers(
            &self,
            query: &str,
            max_results: usize,
            _include_spam_trash: bool,
        ) -> Result<Vec<MessagePointer>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self
                .ids
                .iter()
                .take(max_results)
                .map(|id| MessagePointer::new(*id, ThreadId::new(format!("t-{id}"))))
                .collect())
        }

        fn fetch_full(&self, id: &MessageId) -> Result<Message> {
            self.fetched.lock().unwrap().push(id.to_string());
            if let Some(flag) = &self.cancel_after_first {
                flag.store(true, Ordering::SeqCst);
            }
            if self.missing.contains(&id.as_str()) {
                return Err(Error::NotFound(id.to_string()));
            }
            Ok(Message::builder(id.clone(), ThreadId::new("t")).build())
        }
    }

    #[test]
    fn test_item_failure_excluded_from_batch() {
        let mailbox = FakeMailbox {
            ids: vec!["1", "2", "3"],
            missing: vec!["2"],
            ..Default::default()
        };
        let filter = QueryFilter::new(&mailbox).with_pacer(Box::new(NoDelay));

        let outcome = filter.fetch_matching(&SearchCriteria::new()).unwrap();
        let ids: Vec<&str> = outcome.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id.as_str(), "2");
        assert!(outcome.failures[0].error.is_not_found());
        assert!(outcome.is_partial());
    }

    #[test]
    fn test_zero_max_results_rejected_before_listing() {
        let mailbox = FakeMailbox::default();
        let filter = QueryFilter::new(&mailbox).with_pacer(Box::new(NoDelay));

        let err = filter
            .fetch_matching(&SearchCriteria::new().max_results(0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCriteria(_)));
        assert!(mailbox.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_query_passed_to_provider() {
        let mailbox = FakeMailbox::default();
        let filter = QueryFilter::new(&mailbox).with_pacer(Box::new(NoDelay));
        let criteria = SearchCriteria::new()
            .sender("notify@bank.example")
            .unread_only(true)
            .max_results(5);

        let outcome = filter.fetch_matching(&criteria).unwrap();
        assert_eq!(outcome.query, "from:notify@bank.example is:unread");
        assert!(outcome.messages.is_empty());
        assert!(!outcome.is_partial());
        assert_eq!(
            *mailbox.queries.lock().unwrap(),
            vec!["from:notify@bank.example is:unread".to_string()]
        );
        assert!(mailbox.fetched.lock().unwrap().is_empty());
    }

    #[test]
    fn test_max_results_bounds_fetches() {
        let mailbox = FakeMailbox {
            ids: vec!["a", "b", "c", "d"],
            ..Default::default()
        };
        let filter = QueryFilter::new(&mailbox).with_pacer(Box::new(NoDelay));

        let outcome = filter
            .fetch_matching(&SearchCriteria::new().max_results(2))
            .unwrap();
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(*mailbox.fetched.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_cancel_stops_between_items() {
        let flag = Arc::new(AtomicBool::new(false));
        let mailbox = FakeMailbox {
            ids: vec!["1", "2", "3"],
            cancel_after_first: Some(flag.clone()),
            ..Default::default()
        };
        let filter = QueryFilter::new(&mailbox)
            .with_pacer(Box::new(NoDelay))
            .with_cancel_flag(flag);

        let outcome = filter.fetch_matching(&SearchCriteria::new()).unwrap();
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.cancelled);
        assert_eq!(outcome.listed, 3);
    }
}
