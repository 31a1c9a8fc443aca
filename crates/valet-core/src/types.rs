//! Core types for Valet — sessions, exchanges, speech priorities, artifacts.
//!
//! Everything here is plain data. Behavior lives in the session manager and
//! in the voice orchestrator; keeping the model typed (instead of stringly
//! keyed maps) catches contract errors at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Session state machine
// ─────────────────────────────────────────────

/// Lifecycle state of a conversation session.
///
/// Transitions: idle →(create)→ listening → processing → speaking →
/// followup → idle. Entering `Followup` arms an inactivity timer; entering
/// `Idle` deletes the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
    Followup,
}

/// Conversation mode, classified from the user's recent exchanges.
///
/// Controls the follow-up window length and the presence profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Short, imperative requests ("lights off").
    Command,
    /// Longer back-and-forth with questions.
    Conversation,
    /// Sustained open-ended discussion.
    ThinkingPartner,
}

/// Who produced an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

// ─────────────────────────────────────────────
// Exchanges and sessions
// ─────────────────────────────────────────────

/// One turn of conversation history.
///
/// Appended only through the session manager, which also trims the ring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// True when the user barged in before this response finished.
    #[serde(default)]
    pub was_interrupted: bool,
    /// Where speech had reached when the interruption happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted_at_text: Option<String>,
}

impl Exchange {
    /// Create a user exchange stamped now.
    pub fn user(text: impl Into<String>) -> Self {
        Exchange {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            was_interrupted: false,
            interrupted_at_text: None,
        }
    }

    /// Create an assistant exchange stamped now.
    pub fn assistant(text: impl Into<String>) -> Self {
        Exchange {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            was_interrupted: false,
            interrupted_at_text: None,
        }
    }

    /// Create an assistant exchange cut short by a barge-in.
    pub fn interrupted(text: impl Into<String>, spoken_up_to: impl Into<String>) -> Self {
        Exchange {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            was_interrupted: true,
            interrupted_at_text: Some(spoken_up_to.into()),
        }
    }
}

/// A conversation session.
///
/// At most one non-idle session exists per device; the session manager
/// enforces that on creation. All state is in-memory and lost on restart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub device_id: String,
    pub state: SessionState,
    pub mode: SessionMode,
    /// Whether the device can render display/artifact content.
    pub has_screen: bool,
    pub opened_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub exchanges: Vec<Exchange>,
    /// Running count of conversation-qualifying user exchanges, for the
    /// thinking-partner escalation.
    #[serde(default)]
    pub qualifying_exchanges: u32,
}

impl Session {
    /// Create a new session in the listening state.
    pub fn new(id: impl Into<String>, device_id: impl Into<String>, has_screen: bool) -> Self {
        let now = Utc::now();
        Session {
            id: id.into(),
            device_id: device_id.into(),
            state: SessionState::Listening,
            mode: SessionMode::Command,
            has_screen,
            opened_at: now,
            last_activity_at: now,
            exchanges: Vec::new(),
            qualifying_exchanges: 0,
        }
    }

    /// The most recent assistant exchange, if any.
    pub fn last_assistant_exchange(&self) -> Option<&Exchange> {
        self.exchanges.iter().rev().find(|e| e.role == Role::Assistant)
    }

    /// Seconds between the two most recent user exchanges, if there are two.
    pub fn exchange_pace_secs(&self) -> Option<f64> {
        let mut user_times = self
            .exchanges
            .iter()
            .rev()
            .filter(|e| e.role == Role::User)
            .map(|e| e.timestamp);
        let newest = user_times.next()?;
        let previous = user_times.next()?;
        Some((newest - previous).num_milliseconds() as f64 / 1000.0)
    }
}

// ─────────────────────────────────────────────
// Prompt messages
// ─────────────────────────────────────────────

/// A chat message in prompt-assembly format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant { content: content.into() }
    }

    /// The text content, regardless of role.
    pub fn content(&self) -> &str {
        match self {
            ChatMessage::System { content }
            | ChatMessage::User { content }
            | ChatMessage::Assistant { content } => content,
        }
    }
}

// ─────────────────────────────────────────────
// Speech priorities
// ─────────────────────────────────────────────

/// Speech priority tiers, highest first. Ambient items are shed under load;
/// higher tiers never are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPriority {
    Critical,
    Acknowledgment,
    Response,
    Proactive,
    Ambient,
}

impl SpeechPriority {
    /// All tiers, highest first.
    pub const ALL: [SpeechPriority; 5] = [
        SpeechPriority::Critical,
        SpeechPriority::Acknowledgment,
        SpeechPriority::Response,
        SpeechPriority::Proactive,
        SpeechPriority::Ambient,
    ];

    /// Bucket index: 0 (highest) … 4 (ambient).
    pub fn index(self) -> usize {
        match self {
            SpeechPriority::Critical => 0,
            SpeechPriority::Acknowledgment => 1,
            SpeechPriority::Response => 2,
            SpeechPriority::Proactive => 3,
            SpeechPriority::Ambient => 4,
        }
    }
}

// ─────────────────────────────────────────────
// Artifacts
// ─────────────────────────────────────────────

/// Metadata for a rich artifact emitted alongside its content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    /// Artifact kind, e.g. `"code"`, `"document"`, `"table"`.
    pub artifact_type: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for ArtifactMeta {
    fn default() -> Self {
        ArtifactMeta {
            artifact_type: "code".to_string(),
            title: "Artifact".to_string(),
            language: None,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
