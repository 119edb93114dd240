//! Pure analysis over fetched messages
//!
//! Nothing here performs I/O; every function works on already decoded
//! [`Message`](crate::models::Message) values.

mod batch;
mod extract;

pub use batch::{BatchAnalysis, analyze, parse_message_date};
pub use extract::{
    AMOUNT, CARD_TYPE, ExtractedFields, Extractor, ExtractorRegistry, MERCHANT, RegexExtractor,
    TransactionRecord, card_transactions, extract, parse_amount,
};
