//! Typed contracts at the transport boundary.
//!
//! The transport relay translates device signals into [`CoreCommand`]s and
//! fans [`CoreEvent`]s back out to devices. Everything the core emits or
//! accepts is an explicit message — there are no callback registrations.

use crate::types::{ArtifactMeta, SpeechPriority};

// ─────────────────────────────────────────────
// Reserved sentence indices
// ─────────────────────────────────────────────

/// Sentence index for speculative acknowledgments. Negative indices bypass
/// the ordered-playback protocol entirely.
pub const ACK_INDEX: i32 = -1;

/// Sentence index for the "still working" filler phrase.
pub const PROCESSING_ACK_INDEX: i32 = -2;

/// Sentence index for out-of-band speech: proactive announcements and the
/// spoken error fallback.
pub const OUT_OF_BAND_INDEX: i32 = -3;

// ─────────────────────────────────────────────
// Commands (transport → core)
// ─────────────────────────────────────────────

/// A command from the transport layer to the orchestrator.
#[derive(Clone, Debug)]
pub enum CoreCommand {
    /// A device woke the assistant; open a session.
    SessionStart { device_id: String, has_screen: bool },
    /// A finalized recognition result. Interim transcripts never reach the core.
    Utterance {
        session_id: String,
        text: String,
        confidence: f32,
    },
    /// The user interrupted assistant speech.
    BargeIn { session_id: String, keyword: String },
    /// Explicit end-of-session signal.
    SessionEnd { session_id: String },
}

// ─────────────────────────────────────────────
// Events (core → transport)
// ─────────────────────────────────────────────

/// One chunk of synthesized speech ready for playback.
///
/// Consumers may rely on strict ordering: no chunk for sentence N+1 arrives
/// before every final chunk of sentence N, except for reserved negative
/// indices which are always safe to play immediately.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioEmission {
    pub session_id: String,
    pub bytes: Vec<u8>,
    pub sentence_index: i32,
    pub priority: SpeechPriority,
    pub is_final: bool,
}

/// An event from the orchestrator to the transport layer.
#[derive(Clone, Debug, PartialEq)]
pub enum CoreEvent {
    Audio(AudioEmission),
    /// Every dispatched sentence of the current turn finished playing.
    SpeakingDone { session_id: String },
    BargeIn { session_id: String, keyword: String },
    Display { session_id: String, content: String },
    Action { session_id: String, content: String },
    Artifact {
        session_id: String,
        content: String,
        meta: ArtifactMeta,
    },
}

impl CoreEvent {
    /// The session this event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            CoreEvent::Audio(a) => &a.session_id,
            CoreEvent::SpeakingDone { session_id }
            | CoreEvent::BargeIn { session_id, .. }
            | CoreEvent::Display { session_id, .. }
            | CoreEvent::Action { session_id, .. }
            | CoreEvent::Artifact { session_id, .. } => session_id,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_indices_are_negative_and_distinct() {
        let reserved = [ACK_INDEX, PROCESSING_ACK_INDEX, OUT_OF_BAND_INDEX];
        for idx in reserved {
            assert!(idx < 0);
        }
        assert_ne!(ACK_INDEX, PROCESSING_ACK_INDEX);
        assert_ne!(PROCESSING_ACK_INDEX, OUT_OF_BAND_INDEX);
    }

    #[test]
    fn test_event_session_id() {
        let ev = CoreEvent::Display {
            session_id: "s-9".into(),
            content: "table".into(),
        };
        assert_eq!(ev.session_id(), "s-9");

        let audio = CoreEvent::Audio(AudioEmission {
            session_id: "s-1".into(),
            bytes: vec![1, 2, 3],
            sentence_index: 0,
            priority: SpeechPriority::Response,
            is_final: true,
        });
        assert_eq!(audio.session_id(), "s-1");
    }
}
