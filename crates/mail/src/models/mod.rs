//! Domain models for mail entities

mod criteria;
mod label;
mod message;
mod thread;

pub use criteria::{DEFAULT_MAX_RESULTS, SearchCriteria};
pub use label::{Label, Profile};
pub use message::{Message, MessageBuilder, MessageId, MessagePointer, UNREAD_LABEL};
pub use thread::ThreadId;
