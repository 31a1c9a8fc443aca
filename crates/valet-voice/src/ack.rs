//! Speculative acknowledgments and filler phrases.
//!
//! Short confirmations ("yes", "do it") get an instant canned spoken reply
//! while the real turn spins up, but only when the assistant just asked a
//! confirmation-shaped question and recognition confidence is high. The
//! audio is synthesized once at startup and cached, so playback is
//! immediate.

use std::collections::HashMap;

use futures::StreamExt;
use rand::Rng;
use tracing::{debug, info};

use valet_core::types::Session;
use valet_providers::{AudioStream, SpeechSynthesizer, SynthesisError, SynthesisOptions};

/// Phrases in the last assistant turn that mark it as a confirmation
/// question.
const CONFIRMATION_CUES: &[&str] = &[
    "?",
    "shall i",
    "should i",
    "want me to",
    "would you like",
    "go ahead",
    "ready to",
    "proceed",
];

/// Canned replies, keyed by the exact (lowercased, trimmed) utterance.
const CANNED_ACKS: &[(&[&str], &str)] = &[
    (&["yes", "yeah", "yep", "sure"], "Will do, sir."),
    (&["ok", "okay", "do it"], "Right away, sir."),
    (&["go ahead", "please do"], "Proceeding, sir."),
    (&["no", "nope", "not now"], "Understood, sir."),
];

/// Spoken while a slow turn is still producing nothing.
const FILLER_PHRASES: &[&str] = &[
    "One moment, sir.",
    "Working on it.",
    "Let me check.",
    "Just a second.",
];

/// The canned reply for an utterance, if it is a known confirmation.
pub fn canned_ack_for(utterance: &str) -> Option<&'static str> {
    let normalized = utterance.trim().to_lowercase();
    let normalized = normalized.trim_end_matches(['.', '!']);
    CANNED_ACKS
        .iter()
        .find(|(variants, _)| variants.contains(&normalized))
        .map(|(_, reply)| *reply)
}

/// Whether the last assistant exchange reads as a confirmation question.
pub fn awaiting_confirmation(session: &Session) -> bool {
    let Some(last) = session.last_assistant_exchange() else {
        return false;
    };
    let text = last.text.to_lowercase();
    CONFIRMATION_CUES.iter().any(|cue| text.contains(cue))
}

/// Pre-synthesized acknowledgment and filler audio.
#[derive(Default)]
pub struct AckCache {
    /// Canned reply phrase → audio.
    responses: HashMap<String, Vec<u8>>,
    fillers: Vec<(String, Vec<u8>)>,
}

impl AckCache {
    /// Synthesize every canned phrase up front.
    pub async fn warm(synthesizer: &dyn SpeechSynthesizer) -> Result<AckCache, SynthesisError> {
        let options = SynthesisOptions::default();
        let mut responses = HashMap::new();
        for (_, reply) in CANNED_ACKS {
            let stream = synthesizer.synthesize(reply, "ack-cache", &options).await?;
            responses.insert(reply.to_string(), collect_audio(stream).await?);
        }

        let mut fillers = Vec::new();
        for phrase in FILLER_PHRASES {
            let stream = synthesizer.synthesize(phrase, "ack-cache", &options).await?;
            fillers.push((phrase.to_string(), collect_audio(stream).await?));
        }

        info!(
            responses = responses.len(),
            fillers = fillers.len(),
            "acknowledgment cache warmed"
        );
        Ok(AckCache { responses, fillers })
    }

    /// Cached audio for a canned reply phrase.
    pub fn audio_for(&self, phrase: &str) -> Option<&[u8]> {
        self.responses.get(phrase).map(Vec::as_slice)
    }

    /// A random filler phrase and its audio, if any are cached.
    pub fn pick_filler(&self) -> Option<(&str, &[u8])> {
        if self.fillers.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.fillers.len());
        let (phrase, audio) = &self.fillers[idx];
        Some((phrase.as_str(), audio.as_slice()))
    }
}

/// A matched speculative acknowledgment.
pub struct AckHit<'a> {
    pub phrase: &'static str,
    pub audio: &'a [u8],
}

/// Decide whether an utterance earns an instant canned reply.
///
/// All three gates must pass: confidence above threshold, the assistant's
/// last turn was a confirmation question, and the utterance matches a
/// canned variant exactly.
pub fn check<'a>(
    cache: &'a AckCache,
    utterance: &str,
    confidence: f32,
    threshold: f32,
    session: &Session,
) -> Option<AckHit<'a>> {
    if confidence < threshold {
        return None;
    }
    if !awaiting_confirmation(session) {
        return None;
    }
    let phrase = canned_ack_for(utterance)?;
    let audio = cache.audio_for(phrase)?;
    debug!(phrase, "speculative acknowledgment matched");
    Some(AckHit { phrase, audio })
}

async fn collect_audio(mut stream: AudioStream) -> Result<Vec<u8>, SynthesisError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend(chunk?);
    }
    Ok(bytes)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
