//! Presence profiles — how the assistant should *sound* right now.
//!
//! A handful of context signals resolve, first match wins, into a delivery
//! profile: synthesis speed and emotion offsets, a deliberate response
//! delay, and whether an announcement gets a chime. Crisis always wins.

use valet_core::types::SessionMode;

/// Attention sound played before out-of-band speech.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChimeType {
    None,
    Soft,
    Urgent,
}

/// Which rule produced the profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileKind {
    Crisis,
    Rapid,
    Greeting,
    Reflective,
    Proactive,
    LateNight,
    Neutral,
}

/// Inputs to profile resolution, gathered per utterance.
#[derive(Clone, Debug)]
pub struct PresenceSignals {
    /// Local hour of day, 0–23.
    pub local_hour: u32,
    pub is_first_interaction_today: bool,
    pub session_mode: SessionMode,
    /// Seconds between the last two user turns, if known.
    pub exchange_pace_secs: Option<f64>,
    pub is_proactive_message: bool,
    pub is_crisis: bool,
}

/// How to deliver the next response.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceProfile {
    pub kind: ProfileKind,
    /// Synthesis speed multiplier (1.0 = baseline).
    pub speed: f32,
    /// Emotion offset (0.0 = baseline).
    pub emotion: f32,
    /// Deliberate pause before the first sentence plays.
    pub response_delay_ms: u64,
    pub chime: ChimeType,
}

/// Utterances that demand the calm, immediate profile.
const CRISIS_KEYWORDS: &[&str] = &[
    "emergency",
    "call 911",
    "help me",
    "i'm hurt",
    "i am hurt",
    "can't breathe",
    "chest pain",
    "bleeding",
    "there's a fire",
    "fire alarm",
];

/// Back-to-back user turns faster than this read as urgency.
const RAPID_PACE_SECS: f64 = 6.0;

/// Whether an utterance signals a possible emergency.
pub fn detect_crisis(utterance: &str) -> bool {
    let text = utterance.to_lowercase();
    CRISIS_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// Resolve signals into a delivery profile. First matching rule wins.
pub fn resolve(signals: &PresenceSignals) -> PresenceProfile {
    if signals.is_crisis {
        // Slightly slower and warmer; never add artificial delay.
        return PresenceProfile {
            kind: ProfileKind::Crisis,
            speed: 0.95,
            emotion: 0.3,
            response_delay_ms: 0,
            chime: ChimeType::None,
        };
    }

    let rapid = signals
        .exchange_pace_secs
        .map(|p| p < RAPID_PACE_SECS)
        .unwrap_or(false);
    if rapid && signals.session_mode == SessionMode::Command {
        return PresenceProfile {
            kind: ProfileKind::Rapid,
            speed: 1.1,
            emotion: 0.0,
            response_delay_ms: 0,
            chime: ChimeType::None,
        };
    }

    if signals.is_first_interaction_today {
        return PresenceProfile {
            kind: ProfileKind::Greeting,
            speed: 1.0,
            emotion: 0.15,
            response_delay_ms: mode_delay_ms(signals.session_mode),
            chime: ChimeType::None,
        };
    }

    if signals.session_mode == SessionMode::ThinkingPartner {
        return PresenceProfile {
            kind: ProfileKind::Reflective,
            speed: 0.9,
            emotion: 0.1,
            response_delay_ms: mode_delay_ms(SessionMode::ThinkingPartner),
            chime: ChimeType::None,
        };
    }

    if signals.is_proactive_message {
        return PresenceProfile {
            kind: ProfileKind::Proactive,
            speed: 1.0,
            emotion: 0.05,
            response_delay_ms: 0,
            chime: ChimeType::Soft,
        };
    }

    if signals.local_hour >= 22 || signals.local_hour < 5 {
        return PresenceProfile {
            kind: ProfileKind::LateNight,
            speed: 0.9,
            emotion: -0.1,
            response_delay_ms: mode_delay_ms(signals.session_mode),
            chime: ChimeType::None,
        };
    }

    PresenceProfile {
        kind: ProfileKind::Neutral,
        speed: 1.0,
        emotion: 0.0,
        response_delay_ms: mode_delay_ms(signals.session_mode),
        chime: ChimeType::None,
    }
}

/// Conversational modes get a small beat before replying; commands don't.
fn mode_delay_ms(mode: SessionMode) -> u64 {
    match mode {
        SessionMode::Command => 0,
        SessionMode::Conversation => 120,
        SessionMode::ThinkingPartner => 250,
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn base_signals() -> PresenceSignals {
        PresenceSignals {
            local_hour: 14,
            is_first_interaction_today: false,
            session_mode: SessionMode::Command,
            exchange_pace_secs: None,
            is_proactive_message: false,
            is_crisis: false,
        }
    }

    #[test]
    fn test_neutral_default() {
        let profile = resolve(&base_signals());
        assert_eq!(profile.kind, ProfileKind::Neutral);
        assert_eq!(profile.speed, 1.0);
        assert_eq!(profile.response_delay_ms, 0);
    }

    #[test]
    fn test_crisis_beats_everything() {
        let signals = PresenceSignals {
            is_crisis: true,
            is_first_interaction_today: true,
            is_proactive_message: true,
            local_hour: 23,
            ..base_signals()
        };
        let profile = resolve(&signals);
        assert_eq!(profile.kind, ProfileKind::Crisis);
        assert_eq!(profile.response_delay_ms, 0);
        assert!(profile.speed < 1.0);
    }

    #[test]
    fn test_rapid_command_pace() {
        let signals = PresenceSignals {
            exchange_pace_secs: Some(3.0),
            ..base_signals()
        };
        let profile = resolve(&signals);
        assert_eq!(profile.kind, ProfileKind::Rapid);
        assert!(profile.speed > 1.0);
    }

    #[test]
    fn test_rapid_requires_command_mode() {
        let signals = PresenceSignals {
            exchange_pace_secs: Some(3.0),
            session_mode: SessionMode::Conversation,
            ..base_signals()
        };
        assert_ne!(resolve(&signals).kind, ProfileKind::Rapid);
    }

    #[test]
    fn test_first_interaction_greeting() {
        let signals = PresenceSignals {
            is_first_interaction_today: true,
            ..base_signals()
        };
        let profile = resolve(&signals);
        assert_eq!(profile.kind, ProfileKind::Greeting);
        assert!(profile.emotion > 0.0);
    }

    #[test]
    fn test_thinking_partner_reflective_delay() {
        let signals = PresenceSignals {
            session_mode: SessionMode::ThinkingPartner,
            ..base_signals()
        };
        let profile = resolve(&signals);
        assert_eq!(profile.kind, ProfileKind::Reflective);
        assert_eq!(profile.response_delay_ms, 250);
        assert!(profile.speed < 1.0);
    }

    #[test]
    fn test_proactive_gets_chime_and_no_delay() {
        let signals = PresenceSignals {
            is_proactive_message: true,
            ..base_signals()
        };
        let profile = resolve(&signals);
        assert_eq!(profile.kind, ProfileKind::Proactive);
        assert_eq!(profile.chime, ChimeType::Soft);
        assert_eq!(profile.response_delay_ms, 0);
    }

    #[test]
    fn test_late_night_quiet() {
        for hour in [22, 23, 0, 4] {
            let signals = PresenceSignals {
                local_hour: hour,
                ..base_signals()
            };
            assert_eq!(resolve(&signals).kind, ProfileKind::LateNight, "hour {hour}");
        }
        let signals = PresenceSignals {
            local_hour: 5,
            ..base_signals()
        };
        assert_eq!(resolve(&signals).kind, ProfileKind::Neutral);
    }

    #[test]
    fn test_conversation_mode_delay() {
        let signals = PresenceSignals {
            session_mode: SessionMode::Conversation,
            ..base_signals()
        };
        assert_eq!(resolve(&signals).response_delay_ms, 120);
    }

    #[test]
    fn test_crisis_detection() {
        assert!(detect_crisis("Help me, I think there's a fire downstairs"));
        assert!(detect_crisis("CALL 911 right now"));
        assert!(!detect_crisis("set a timer for ten minutes"));
        assert!(!detect_crisis("that movie was fire"));
    }
}
