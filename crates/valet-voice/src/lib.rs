//! Voice orchestration core for Valet.
//!
//! Turns a streaming language-model response into ordered, interruptible
//! speech: sentences are detected as tokens arrive, routed by delivery tag,
//! synthesized concurrently, and emitted strictly in order. Barge-in
//! cancels everything mid-flight.
//!
//! The [`orchestrator::Orchestrator`] is the entry point; everything else
//! here is a building block it composes.

pub mod ack;
pub mod display_queue;
pub mod orchestrator;
pub mod playback;
pub mod presence;
pub mod rewrite;
pub mod router;
pub mod sentence;
pub mod speech_queue;

pub use orchestrator::{Orchestrator, OrchestratorError};
