//! Shared domain types for the chatmail RPC client.
//!
//! Everything here is transport-agnostic: identifiers issued by the core
//! server, the decoded event union, the wire timestamp and the common error
//! type. The process plumbing lives in `chatmail-rpc`.

pub mod errors;
pub mod event;
pub mod ids;
pub mod logging;
pub mod timestamp;

pub use errors::{Error, Result};
pub use event::{Event, EventKind};
pub use ids::{AccountId, ChatId, ContactId, MsgId, CONTACT_LAST_SPECIAL, CONTACT_SELF};
pub use timestamp::Timestamp;
