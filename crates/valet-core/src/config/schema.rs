//! Configuration schema — tuning knobs for the voice orchestration core.
//!
//! Hierarchy: `Config` → `SessionConfig`, `SpeechConfig`, `DisplayConfig`,
//! `GenerationConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.valet/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub session: SessionConfig,
    pub speech: SpeechConfig,
    pub display: DisplayConfig,
    pub generation: GenerationConfig,
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Maximum exchanges kept per session (oldest trimmed first).
    pub max_exchanges: usize,
    /// Follow-up window after speaking, command mode (seconds).
    pub followup_window_command_s: u64,
    /// Follow-up window after speaking, conversation / thinking-partner
    /// modes (seconds).
    pub followup_window_conversation_s: u64,
    /// Absolute session lifetime from creation, regardless of activity
    /// (seconds).
    pub max_session_duration_s: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_exchanges: 40,
            followup_window_command_s: 8,
            followup_window_conversation_s: 30,
            max_session_duration_s: 1800,
        }
    }
}

// ─────────────────────────────────────────────
// Speech
// ─────────────────────────────────────────────

/// Speech pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechConfig {
    /// Minimum recognition confidence for a speculative acknowledgment.
    pub ack_confidence_threshold: f32,
    /// Delay before the "still working" filler phrase plays (milliseconds).
    pub processing_ack_delay_ms: u64,
    /// Total speech-queue depth at which ambient items are shed.
    pub max_queue_depth: usize,
    /// How many sentences ahead of the playback cursor may be buffered.
    pub max_buffered_sentences: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            ack_confidence_threshold: 0.85,
            processing_ack_delay_ms: 2000,
            max_queue_depth: 5,
            max_buffered_sentences: 16,
        }
    }
}

// ─────────────────────────────────────────────
// Display
// ─────────────────────────────────────────────

/// Undeliverable-screen-content buffer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayConfig {
    /// Maximum queued display items (oldest dropped first).
    pub max_items: usize,
    /// Time-to-live per item (seconds).
    pub ttl_s: u64,
    /// Background prune interval (seconds).
    pub prune_interval_s: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_items: 20,
            ttl_s: 7200,
            prune_interval_s: 300,
        }
    }
}

// ─────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────

/// Language-model request settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
