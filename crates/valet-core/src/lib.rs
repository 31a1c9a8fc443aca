//! Core building blocks for the Valet voice assistant.
//!
//! This crate holds everything the voice orchestrator and the transport layer
//! share: the session/exchange domain model, the typed command/event contract
//! at the transport boundary, the bounded message bus, the configuration
//! system, and the in-memory session state machine.

pub mod bus;
pub mod config;
pub mod events;
pub mod session;
pub mod types;
pub mod utils;
