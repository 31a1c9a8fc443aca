//! Session state machine — in-memory, intentionally ephemeral.
//!
//! Sessions live only for the duration of a conversation: created on wake,
//! deleted on explicit end, follow-up timeout, or max-lifetime expiry.
//! Nothing is persisted across restarts.

pub mod manager;

pub use manager::{OnSessionEndFn, SessionError, SessionManager};
