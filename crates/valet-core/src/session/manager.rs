//! Session manager — conversation state machine, exchange history, and mode
//! classification.
//!
//! All state is in-memory. The manager owns the follow-up inactivity timers:
//! entering `Followup` arms one sized by the session mode, any exit from
//! `Followup` cancels it, and entering `Idle` deletes the session and fires
//! the `on_session_end` callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::schema::SessionConfig;
use crate::types::{ChatMessage, Exchange, Role, Session, SessionMode, SessionState};
use crate::utils::{truncate_string, word_count};

/// Callback fired when a session is destroyed (explicit end, follow-up
/// timeout, or max-lifetime expiry). Receives the session id.
pub type OnSessionEndFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Word-count threshold above which an exchange reads as conversational.
const CONVERSATION_WORDS_THRESHOLD: f64 = 15.0;

/// Qualifying exchanges needed before escalating to thinking-partner mode.
const THINKING_PARTNER_THRESHOLD: u32 = 3;

/// How much of an interrupted response is kept for context.
const INTERRUPTED_TEXT_KEEP: usize = 80;

/// System prompt for devices that can render display/artifact content.
const SCREEN_SYSTEM_PROMPT: &str = "You are Valet, a voice-first personal assistant. \
The user's device has a screen. Structure every reply with delivery tags: wrap spoken \
text in [VOICE], content to render on screen in [DISPLAY], device actions in [ACTION], \
and rich content in [ARTIFACT type=\"...\" title=\"...\"]...[/ARTIFACT]. Keep the spoken \
portion short and conversational; put tables, lists, and code on the screen.";

/// System prompt for voice-only devices.
const VOICE_ONLY_SYSTEM_PROMPT: &str = "You are Valet, a voice-first personal assistant. \
The user's device has no screen; everything you produce will be spoken aloud. Reply in \
short, natural sentences with no markup, no lists, and no code blocks. Spell out \
anything that would not read well aloud.";

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
}

// ─────────────────────────────────────────────
// SessionManager
// ─────────────────────────────────────────────

/// Manages conversation sessions. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Session>>,
    /// Follow-up inactivity timers, one per session at most.
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    /// device_id → last interaction date (YYYY-MM-DD).
    last_seen: Mutex<HashMap<String, String>>,
    on_session_end: Mutex<Option<OnSessionEndFn>>,
    id_counter: AtomicU64,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        SessionManager {
            inner: Arc::new(Inner {
                config,
                sessions: RwLock::new(HashMap::new()),
                timers: Mutex::new(HashMap::new()),
                last_seen: Mutex::new(HashMap::new()),
                on_session_end: Mutex::new(None),
                id_counter: AtomicU64::new(1),
            }),
        }
    }

    /// Register the session-end callback.
    pub fn set_on_session_end(&self, callback: OnSessionEndFn) {
        *self.inner.on_session_end.lock().unwrap() = Some(callback);
    }

    // ── Lifecycle ──

    /// Create a session for a device, in the listening state.
    ///
    /// At most one non-idle session exists per device: any existing session
    /// for this device is ended first.
    pub fn create_session(&self, device_id: &str, has_screen: bool) -> Session {
        if let Some(existing) = self.session_for_device(device_id) {
            debug!(session_id = %existing.id, "replacing existing session for device");
            self.end_session(&existing.id);
        }

        let n = self.inner.id_counter.fetch_add(1, Ordering::Relaxed);
        let id = format!("{device_id}-{n}");
        let session = Session::new(&id, device_id, has_screen);

        self.inner
            .sessions
            .write()
            .unwrap()
            .insert(id.clone(), session.clone());

        info!(session_id = %id, device_id = %device_id, "session opened");
        session
    }

    /// Get a snapshot of a session.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.sessions.read().unwrap().get(id).cloned()
    }

    /// The current session for a device, if any.
    pub fn session_for_device(&self, device_id: &str) -> Option<Session> {
        self.inner
            .sessions
            .read()
            .unwrap()
            .values()
            .find(|s| s.device_id == device_id)
            .cloned()
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.inner.sessions.read().unwrap().len()
    }

    /// Transition a session to a new state.
    ///
    /// `Followup` arms the inactivity timer; any other state cancels it.
    /// `Idle` destroys the session.
    pub fn set_state(&self, id: &str, state: SessionState) -> Result<(), SessionError> {
        if state == SessionState::Idle {
            if !self.end_session(id) {
                return Err(SessionError::NotFound(id.to_string()));
            }
            return Ok(());
        }

        self.cancel_timer(id);

        let mode = {
            let mut sessions = self.inner.sessions.write().unwrap();
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            session.state = state;
            session.last_activity_at = Utc::now();
            session.mode
        };

        debug!(session_id = %id, state = ?state, "session state change");

        if state == SessionState::Followup {
            self.arm_followup_timer(id, mode);
        }
        Ok(())
    }

    /// Destroy a session: remove it, cancel its timer, fire the callback.
    ///
    /// Returns `true` if the session existed.
    pub fn end_session(&self, id: &str) -> bool {
        self.cancel_timer(id);

        let existed = self
            .inner
            .sessions
            .write()
            .unwrap()
            .remove(id)
            .is_some();

        if existed {
            info!(session_id = %id, "session ended");
            let callback = self.inner.on_session_end.lock().unwrap().clone();
            if let Some(cb) = callback {
                cb(id);
            }
        }
        existed
    }

    /// Whether the session exists and is within its absolute max lifetime.
    pub fn is_session_valid(&self, id: &str) -> bool {
        match self.get(id) {
            Some(session) => {
                let age = Utc::now() - session.opened_at;
                age.num_seconds() < self.inner.config.max_session_duration_s as i64
            }
            None => false,
        }
    }

    // ── Exchange history ──

    /// Append a user exchange, trim the ring, and reclassify the mode.
    ///
    /// Returns the session's (possibly updated) mode.
    pub fn add_user_exchange(&self, id: &str, text: &str) -> Result<SessionMode, SessionError> {
        let mut sessions = self.inner.sessions.write().unwrap();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if word_count(text) as f64 > CONVERSATION_WORDS_THRESHOLD || text.contains('?') {
            session.qualifying_exchanges += 1;
        }

        session.exchanges.push(Exchange::user(text));
        Self::trim_exchanges(session, self.inner.config.max_exchanges);
        session.last_activity_at = Utc::now();
        session.mode = Self::classify(session);
        Ok(session.mode)
    }

    /// Append a completed assistant exchange.
    pub fn add_assistant_exchange(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let mut sessions = self.inner.sessions.write().unwrap();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.exchanges.push(Exchange::assistant(text));
        Self::trim_exchanges(session, self.inner.config.max_exchanges);
        session.last_activity_at = Utc::now();
        Ok(())
    }

    /// Append an assistant exchange cut short by a barge-in. The partial
    /// text is kept (truncated) so later turns still have context.
    pub fn add_interrupted_exchange(&self, id: &str, partial: &str) -> Result<(), SessionError> {
        let mut sessions = self.inner.sessions.write().unwrap();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.exchanges.push(Exchange::interrupted(
            partial,
            truncate_string(partial, INTERRUPTED_TEXT_KEEP),
        ));
        Self::trim_exchanges(session, self.inner.config.max_exchanges);
        session.last_activity_at = Utc::now();
        Ok(())
    }

    /// Whether this is the device's first interaction today. Updates the
    /// last-seen date as a side effect.
    pub fn is_first_interaction_today(&self, device_id: &str) -> bool {
        let today = crate::utils::today_date();
        let mut last_seen = self.inner.last_seen.lock().unwrap();
        let previous = last_seen.insert(device_id.to_string(), today.clone());
        previous.as_deref() != Some(today.as_str())
    }

    // ── Prompt assembly ──

    /// Assemble the prompt: system prompt (screen-aware vs voice-only) +
    /// exchange history. The newest user exchange is the final message.
    pub fn build_messages(&self, id: &str) -> Result<Vec<ChatMessage>, SessionError> {
        let sessions = self.inner.sessions.read().unwrap();
        let session = sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let system = if session.has_screen {
            SCREEN_SYSTEM_PROMPT
        } else {
            VOICE_ONLY_SYSTEM_PROMPT
        };

        let mut messages = Vec::with_capacity(session.exchanges.len() + 1);
        messages.push(ChatMessage::system(system));

        for exchange in &session.exchanges {
            let content = if exchange.was_interrupted {
                format!("{} [interrupted by user]", exchange.text)
            } else {
                exchange.text.clone()
            };
            messages.push(match exchange.role {
                Role::User => ChatMessage::user(content),
                Role::Assistant => ChatMessage::assistant(content),
            });
        }
        Ok(messages)
    }

    // ── Internals ──

    fn trim_exchanges(session: &mut Session, max: usize) {
        let len = session.exchanges.len();
        if len > max {
            session.exchanges.drain(..len - max);
        }
    }

    /// Recompute mode from the last 3 user exchanges.
    fn classify(session: &Session) -> SessionMode {
        let users: Vec<&Exchange> = session
            .exchanges
            .iter()
            .filter(|e| e.role == Role::User)
            .collect();

        if users.len() <= 1 {
            return SessionMode::Command;
        }

        let window = &users[users.len().saturating_sub(3)..];
        let avg_words = window.iter().map(|e| word_count(&e.text)).sum::<usize>() as f64
            / window.len() as f64;
        let any_question = window.iter().any(|e| e.text.contains('?'));

        if avg_words > CONVERSATION_WORDS_THRESHOLD || any_question {
            if session.qualifying_exchanges >= THINKING_PARTNER_THRESHOLD {
                SessionMode::ThinkingPartner
            } else {
                SessionMode::Conversation
            }
        } else {
            SessionMode::Command
        }
    }

    fn followup_window_secs(&self, mode: SessionMode) -> u64 {
        match mode {
            SessionMode::Command => self.inner.config.followup_window_command_s,
            SessionMode::Conversation | SessionMode::ThinkingPartner => {
                self.inner.config.followup_window_conversation_s
            }
        }
    }

    fn arm_followup_timer(&self, id: &str, mode: SessionMode) {
        let secs = self.followup_window_secs(mode);
        let manager = self.clone();
        let session_id = id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
            manager.expire_followup(&session_id);
        });

        if let Some(old) = self.inner.timers.lock().unwrap().insert(id.to_string(), handle) {
            old.abort();
        }
    }

    /// Timer fired: end the session, but only if it is still in follow-up.
    fn expire_followup(&self, id: &str) {
        let still_followup = self
            .get(id)
            .map(|s| s.state == SessionState::Followup)
            .unwrap_or(false);
        if still_followup {
            debug!(session_id = %id, "follow-up window expired");
            self.end_session(id);
        }
    }

    fn cancel_timer(&self, id: &str) {
        if let Some(handle) = self.inner.timers.lock().unwrap().remove(id) {
            handle.abort();
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
