//! Criteria-driven retrieval
//!
//! Turns [`SearchCriteria`](crate::models::SearchCriteria) into a provider
//! query, lists the matching pointers and materializes them one by one.

mod filter;
mod pacing;

pub use filter::{FetchFailure, FetchOutcome, QueryFilter};
pub use pacing::{FixedDelay, NoDelay, Pacer, pacer_for};
