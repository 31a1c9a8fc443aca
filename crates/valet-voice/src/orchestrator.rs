//! The streaming turn orchestrator.
//!
//! Owns the full path from a recognized utterance to ordered audio out:
//! speculative acknowledgment, prompt assembly, token streaming, tag
//! routing, sentence detection, concurrent per-sentence synthesis, ordered
//! emission, and barge-in cancellation. One spawned task per turn; sentence
//! synthesis fans out into further tasks that report back over a channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Timelike;
use futures::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use valet_core::bus::CoreBus;
use valet_core::config::schema::Config;
use valet_core::events::{
    AudioEmission, CoreCommand, CoreEvent, ACK_INDEX, OUT_OF_BAND_INDEX, PROCESSING_ACK_INDEX,
};
use valet_core::session::SessionManager;
use valet_core::types::{ArtifactMeta, ChatMessage, Session, SessionState, SpeechPriority};
use valet_providers::{
    GenerationOptions, SpeechSynthesizer, SynthesisOptions, TextGenerator,
};

use crate::ack::{self, AckCache};
use crate::display_queue::{DisplayItem, DisplayQueue};
use crate::playback::{AudioChunk, PlaybackSequencer};
use crate::presence::{self, PresenceProfile, PresenceSignals};
use crate::rewrite::rewrite_for_voice;
use crate::router::{DeliveryRouter, RouterEvent};
use crate::sentence::SentenceDetector;
use crate::speech_queue::{SpeechItem, SpeechPriorityQueue};

/// Spoken when a response cannot be produced at all.
const FALLBACK_PHRASES: &[&str] = &[
    "I'm having trouble with that right now, sir.",
    "Something went wrong on my end. Give me a moment.",
    "I couldn't finish that request, sir.",
];

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session expired: {0}")]
    SessionExpired(String),
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

/// The voice turn orchestrator. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    sessions: SessionManager,
    displays: DisplayQueue,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    events: mpsc::Sender<CoreEvent>,
    ack_cache: AckCache,
    /// In-flight turn per session, at most one.
    turns: Mutex<HashMap<String, Turn>>,
    speech_queue: Mutex<SpeechPriorityQueue>,
    turn_counter: AtomicU64,
}

struct Turn {
    id: u64,
    cancel: CancellationToken,
    shared: Arc<TurnShared>,
}

/// State a turn exposes to the outside (for barge-in bookkeeping).
#[derive(Default)]
struct TurnShared {
    /// Sentences dispatched to synthesis so far.
    response: Mutex<String>,
    first_sentence_dispatched: AtomicBool,
}

impl Orchestrator {
    /// Build an orchestrator and warm the acknowledgment cache.
    pub async fn new(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        events: mpsc::Sender<CoreEvent>,
    ) -> Self {
        let ack_cache = match AckCache::warm(synthesizer.as_ref()).await {
            Ok(cache) => cache,
            Err(e) => {
                warn!(error = %e, "acknowledgment cache warm failed, continuing without it");
                AckCache::default()
            }
        };

        let inner = Arc::new(Inner {
            sessions: SessionManager::new(config.session.clone()),
            displays: DisplayQueue::new(config.display.clone()),
            speech_queue: Mutex::new(SpeechPriorityQueue::new(config.speech.max_queue_depth)),
            config,
            generator,
            synthesizer,
            events,
            ack_cache,
            turns: Mutex::new(HashMap::new()),
            turn_counter: AtomicU64::new(1),
        });

        // A destroyed session must take its in-flight turn and queued
        // speech with it, however it was ended.
        let weak = Arc::downgrade(&inner);
        inner.sessions.set_on_session_end(Arc::new(move |id: &str| {
            if let Some(inner) = weak.upgrade() {
                if let Some(turn) = inner.turns.lock().unwrap().remove(id) {
                    turn.cancel.cancel();
                }
                inner.speech_queue.lock().unwrap().clear_session(id);
            }
        }));

        Orchestrator { inner }
    }

    /// The session manager, for transport-side lookups.
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Take everything parked for screenless sessions.
    pub fn pending_display(&self) -> Vec<DisplayItem> {
        self.inner.displays.drain()
    }

    /// Open a session for a device.
    pub fn start_session(&self, device_id: &str, has_screen: bool) -> Session {
        self.inner.sessions.create_session(device_id, has_screen)
    }

    /// Consume commands from the bus until the transport side hangs up.
    pub async fn run(&self, bus: &CoreBus) -> anyhow::Result<()> {
        info!("orchestrator loop started");

        let displays = self.inner.displays.clone();
        let prune = tokio::spawn(async move { displays.run_prune_loop().await });

        while let Some(command) = bus.next_command().await {
            match command {
                CoreCommand::SessionStart { device_id, has_screen } => {
                    self.start_session(&device_id, has_screen);
                }
                CoreCommand::Utterance { session_id, text, confidence } => {
                    if let Err(e) = self.process_utterance(&session_id, &text, confidence).await {
                        warn!(error = %e, "utterance rejected");
                    }
                }
                CoreCommand::BargeIn { session_id, keyword } => {
                    self.handle_barge_in(&session_id, &keyword).await;
                }
                CoreCommand::SessionEnd { session_id } => {
                    self.inner.sessions.end_session(&session_id);
                }
            }
        }

        self.inner.displays.destroy();
        let _ = prune.await;
        info!("orchestrator loop stopped");
        Ok(())
    }

    // ── Utterances ──

    /// Handle a finalized utterance: maybe ack instantly, then start a turn.
    pub async fn process_utterance(
        &self,
        session_id: &str,
        text: &str,
        confidence: f32,
    ) -> Result<(), OrchestratorError> {
        let session = self
            .inner
            .sessions
            .get(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        if !self.inner.sessions.is_session_valid(session_id) {
            self.inner.sessions.end_session(session_id);
            return Err(OrchestratorError::SessionExpired(session_id.to_string()));
        }

        // A new utterance supersedes any in-flight turn; the superseded
        // response is abandoned without an exchange record.
        if let Some(previous) = self.inner.turns.lock().unwrap().remove(session_id) {
            debug!(session_id, "superseding in-flight turn");
            previous.cancel.cancel();
        }

        let mut ack_played = false;
        if let Some(hit) = ack::check(
            &self.inner.ack_cache,
            text,
            confidence,
            self.inner.config.speech.ack_confidence_threshold,
            &session,
        ) {
            ack_played = true;
            self.emit_audio(
                session_id,
                hit.audio.to_vec(),
                ACK_INDEX,
                SpeechPriority::Acknowledgment,
                true,
            )
            .await;
        }

        let first_today = self.inner.sessions.is_first_interaction_today(&session.device_id);
        let crisis = presence::detect_crisis(text);

        let mode = self
            .inner
            .sessions
            .add_user_exchange(session_id, text)
            .map_err(|_| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        let _ = self.inner.sessions.set_state(session_id, SessionState::Processing);

        let pace = self
            .inner
            .sessions
            .get(session_id)
            .and_then(|s| s.exchange_pace_secs());
        let profile = presence::resolve(&PresenceSignals {
            local_hour: chrono::Local::now().hour(),
            is_first_interaction_today: first_today,
            session_mode: mode,
            exchange_pace_secs: pace,
            is_proactive_message: false,
            is_crisis: crisis,
        });

        let messages = self
            .inner
            .sessions
            .build_messages(session_id)
            .map_err(|_| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        let turn_id = self.inner.turn_counter.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let shared = Arc::new(TurnShared::default());
        self.inner.turns.lock().unwrap().insert(
            session_id.to_string(),
            Turn {
                id: turn_id,
                cancel: cancel.clone(),
                shared: shared.clone(),
            },
        );

        info!(session_id, turn_id, mode = ?mode, profile = ?profile.kind, "starting turn");

        let orch = self.clone();
        let sid = session_id.to_string();
        let has_screen = session.has_screen;
        tokio::spawn(async move {
            orch.run_turn(sid, turn_id, cancel, shared, messages, profile, has_screen, ack_played)
                .await;
        });
        Ok(())
    }

    /// The user interrupted: cancel everything, remember how far we got.
    pub async fn handle_barge_in(&self, session_id: &str, keyword: &str) {
        let turn = self.inner.turns.lock().unwrap().remove(session_id);
        if let Some(turn) = turn {
            turn.cancel.cancel();
            let partial = turn.shared.response.lock().unwrap().clone();
            let partial = partial.trim();
            if !partial.is_empty() {
                let _ = self.inner.sessions.add_interrupted_exchange(session_id, partial);
            }
        }

        self.inner.speech_queue.lock().unwrap().clear_session(session_id);
        let _ = self.inner.sessions.set_state(session_id, SessionState::Listening);

        info!(session_id, keyword, "barge-in");
        self.emit(CoreEvent::BargeIn {
            session_id: session_id.to_string(),
            keyword: keyword.to_string(),
        })
        .await;
    }

    // ── Announcements ──

    /// Speak a proactive message. Spoken immediately when the session is
    /// quiet, otherwise queued until the current response finishes.
    pub async fn announce(
        &self,
        session_id: &str,
        text: &str,
        priority: SpeechPriority,
    ) -> Result<(), OrchestratorError> {
        if self.inner.sessions.get(session_id).is_none() {
            return Err(OrchestratorError::SessionNotFound(session_id.to_string()));
        }

        let busy = self.inner.turns.lock().unwrap().contains_key(session_id);
        if busy {
            let queued = self.inner.speech_queue.lock().unwrap().enqueue(SpeechItem {
                session_id: session_id.to_string(),
                text: text.to_string(),
                priority,
            });
            if !queued {
                debug!(session_id, "announcement shed under load");
            }
            return Ok(());
        }

        self.speak_out_of_band(session_id, text, priority).await;
        Ok(())
    }

    // ── Turn execution ──

    #[allow(clippy::too_many_arguments)]
    async fn run_turn(
        self,
        session_id: String,
        turn_id: u64,
        cancel: CancellationToken,
        shared: Arc<TurnShared>,
        messages: Vec<ChatMessage>,
        profile: PresenceProfile,
        has_screen: bool,
        ack_played: bool,
    ) {
        let options = GenerationOptions {
            max_tokens: self.inner.config.generation.max_tokens,
            temperature: self.inner.config.generation.temperature,
        };

        let mut stream = match self
            .inner
            .generator
            .stream(&messages, &options, cancel.child_token())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session_id, error = %e, "generation request failed");
                self.speak_fallback(&session_id).await;
                self.finish_turn(&session_id, turn_id).await;
                return;
            }
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<(u32, AudioChunk)>(64);
        let mut router = DeliveryRouter::new();
        let mut playback =
            PlaybackSequencer::new(self.inner.config.speech.max_buffered_sentences);
        let mut state = TurnState {
            session_id: session_id.clone(),
            turn_id,
            has_screen,
            profile,
            shared,
            cancel: cancel.clone(),
            chunk_tx,
            detector: SentenceDetector::new(),
            next_index: 0,
            voice_text: String::new(),
            display_parts: Vec::new(),
            action_parts: Vec::new(),
            artifacts: Vec::new(),
        };
        let mut stream_done = false;
        let mut stream_failed = false;

        let ack_timer = tokio::time::sleep(Duration::from_millis(
            self.inner.config.speech.processing_ack_delay_ms,
        ));
        tokio::pin!(ack_timer);
        // An instant speculative ack already covered the silence.
        let mut ack_armed = !ack_played;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id, turn_id, "turn cancelled");
                    return;
                }
                _ = &mut ack_timer, if ack_armed => {
                    ack_armed = false;
                    if !state.shared.first_sentence_dispatched.load(Ordering::SeqCst) {
                        if let Some((phrase, audio)) = self.inner.ack_cache.pick_filler() {
                            debug!(session_id, phrase, "playing processing filler");
                            self.emit_audio(
                                &session_id,
                                audio.to_vec(),
                                PROCESSING_ACK_INDEX,
                                SpeechPriority::Acknowledgment,
                                true,
                            )
                            .await;
                        }
                    }
                }
                token = stream.next(), if !stream_done => {
                    match token {
                        Some(Ok(text)) => {
                            for event in router.push(&text) {
                                state.absorb(&self, event);
                            }
                        }
                        Some(Err(e)) => {
                            warn!(session_id, error = %e, "generation stream failed");
                            stream_done = true;
                            stream_failed = true;
                            playback.set_total(state.next_index);
                            state.record_response(&self);
                        }
                        None => {
                            stream_done = true;
                            for event in router.flush() {
                                state.absorb(&self, event);
                            }
                            if let Some(tail) = state.detector.flush() {
                                state.dispatch(&self, tail);
                            }
                            playback.set_total(state.next_index);
                            self.deliver_side_channels(&mut state).await;
                            state.record_response(&self);
                        }
                    }
                }
                chunk = chunk_rx.recv() => {
                    // select! may pick a ready chunk in the same round the
                    // cancellation fires; nothing plays after an abort.
                    if cancel.is_cancelled() {
                        debug!(session_id, turn_id, "turn cancelled");
                        return;
                    }
                    // `state` holds a sender, so this is always Some.
                    if let Some((index, chunk)) = chunk {
                        for (i, cleared) in playback.on_chunk(index, chunk) {
                            self.emit_audio(
                                &session_id,
                                cleared.bytes,
                                i as i32,
                                SpeechPriority::Response,
                                cleared.is_final,
                            )
                            .await;
                        }
                    }
                }
            }

            if stream_done && playback.is_complete() {
                break;
            }
        }

        // Any generation failure ends in a spoken apology, even when part
        // of the response already played.
        if stream_failed {
            self.speak_fallback(&session_id).await;
        }
        self.finish_turn(&session_id, turn_id).await;
    }

    /// Close out a finished turn, unless a newer one already owns the session.
    async fn finish_turn(&self, session_id: &str, turn_id: u64) {
        {
            let mut turns = self.inner.turns.lock().unwrap();
            match turns.get(session_id) {
                Some(turn) if turn.id == turn_id => {
                    turns.remove(session_id);
                }
                _ => return,
            }
        }

        let _ = self.inner.sessions.set_state(session_id, SessionState::Followup);
        self.emit(CoreEvent::SpeakingDone {
            session_id: session_id.to_string(),
        })
        .await;

        self.drain_announcements(session_id).await;
    }

    /// Speak announcements that queued up behind the finished response.
    async fn drain_announcements(&self, session_id: &str) {
        loop {
            let item = self
                .inner
                .speech_queue
                .lock()
                .unwrap()
                .dequeue_for_session(session_id);
            let Some(item) = item else { return };
            self.speak_out_of_band(&item.session_id, &item.text, item.priority).await;
        }
    }

    /// Emit display, action, and artifact output gathered during the turn.
    /// Screenless sessions get their screen content parked instead.
    async fn deliver_side_channels(&self, state: &mut TurnState) {
        let display = state.display_parts.join("\n");
        let display = display.trim();
        if !display.is_empty() {
            if state.has_screen {
                self.emit(CoreEvent::Display {
                    session_id: state.session_id.clone(),
                    content: display.to_string(),
                })
                .await;
            } else {
                self.inner.displays.enqueue(&state.session_id, display);
            }
        }

        for action in state.action_parts.drain(..) {
            let action = action.trim().to_string();
            if action.is_empty() {
                continue;
            }
            self.emit(CoreEvent::Action {
                session_id: state.session_id.clone(),
                content: action,
            })
            .await;
        }

        for (content, meta) in state.artifacts.drain(..) {
            if state.has_screen {
                self.emit(CoreEvent::Artifact {
                    session_id: state.session_id.clone(),
                    content,
                    meta,
                })
                .await;
            } else {
                self.inner.displays.enqueue(&state.session_id, &content);
            }
        }
    }

    // ── Out-of-band speech ──

    async fn speak_fallback(&self, session_id: &str) {
        let idx = rand::rng().random_range(0..FALLBACK_PHRASES.len());
        self.speak_out_of_band(session_id, FALLBACK_PHRASES[idx], SpeechPriority::Response)
            .await;
    }

    /// Synthesize and emit speech outside the ordered sentence protocol.
    async fn speak_out_of_band(&self, session_id: &str, text: &str, priority: SpeechPriority) {
        let options = SynthesisOptions::default();
        let mut stream = match self
            .inner
            .synthesizer
            .synthesize(text, session_id, &options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session_id, error = %e, "out-of-band synthesis failed");
                return;
            }
        };

        let mut pending: Option<Vec<u8>> = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => {
                    if let Some(prev) = pending.replace(bytes) {
                        self.emit_audio(session_id, prev, OUT_OF_BAND_INDEX, priority, false)
                            .await;
                    }
                }
                Err(e) => {
                    warn!(session_id, error = %e, "out-of-band synthesis stream error");
                    break;
                }
            }
        }
        if let Some(last) = pending.take() {
            self.emit_audio(session_id, last, OUT_OF_BAND_INDEX, priority, true).await;
        }
    }

    // ── Event emission ──

    async fn emit(&self, event: CoreEvent) {
        if self.inner.events.send(event).await.is_err() {
            debug!("event channel closed, dropping event");
        }
    }

    async fn emit_audio(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        sentence_index: i32,
        priority: SpeechPriority,
        is_final: bool,
    ) {
        self.emit(CoreEvent::Audio(AudioEmission {
            session_id: session_id.to_string(),
            bytes,
            sentence_index,
            priority,
            is_final,
        }))
        .await;
    }
}

// ─────────────────────────────────────────────
// Per-turn state
// ─────────────────────────────────────────────

/// Mutable state of one in-flight turn, owned by its task.
struct TurnState {
    session_id: String,
    turn_id: u64,
    has_screen: bool,
    profile: PresenceProfile,
    shared: Arc<TurnShared>,
    cancel: CancellationToken,
    chunk_tx: mpsc::Sender<(u32, AudioChunk)>,
    detector: SentenceDetector,
    next_index: u32,
    /// Full voice-channel text, for the exchange record.
    voice_text: String,
    display_parts: Vec<String>,
    action_parts: Vec<String>,
    artifacts: Vec<(String, ArtifactMeta)>,
}

impl TurnState {
    fn absorb(&mut self, orch: &Orchestrator, event: RouterEvent) {
        match event {
            RouterEvent::Voice(text) => {
                self.voice_text.push_str(&text);
                for sentence in self.detector.add_token(&text) {
                    self.dispatch(orch, sentence);
                }
            }
            RouterEvent::Display(text) => self.display_parts.push(text),
            RouterEvent::Action(text) => self.action_parts.push(text),
            RouterEvent::Artifact { content, meta } => self.artifacts.push((content, meta)),
        }
    }

    /// Send one sentence to synthesis. The spawned task reports its audio
    /// back over `chunk_tx` and always closes the sentence with a final
    /// chunk, so ordering survives synthesis failure.
    fn dispatch(&mut self, orch: &Orchestrator, sentence: String) {
        let index = self.next_index;
        self.next_index += 1;

        let spoken = if self.has_screen {
            sentence
        } else {
            rewrite_for_voice(&sentence)
        };

        if !self.shared.first_sentence_dispatched.swap(true, Ordering::SeqCst) {
            let _ = orch
                .inner
                .sessions
                .set_state(&self.session_id, SessionState::Speaking);
        }

        {
            let mut dispatched = self.shared.response.lock().unwrap();
            if !dispatched.is_empty() {
                dispatched.push(' ');
            }
            dispatched.push_str(&spoken);
        }

        let synthesizer = orch.inner.synthesizer.clone();
        let context_id = format!("{}-turn-{}", self.session_id, self.turn_id);
        let options = SynthesisOptions {
            voice_id: None,
            speed: self.profile.speed,
            emotion: self.profile.emotion,
        };
        // The deliberate pause applies once, before the first sentence.
        let delay_ms = if index == 0 { self.profile.response_delay_ms } else { 0 };
        let chunk_tx = self.chunk_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            synthesize_sentence(
                synthesizer,
                spoken,
                context_id,
                options,
                delay_ms,
                index,
                chunk_tx,
                cancel,
            )
            .await;
        });
    }

    fn record_response(&self, orch: &Orchestrator) {
        let text = self.voice_text.trim();
        if !text.is_empty() {
            let _ = orch.inner.sessions.add_assistant_exchange(&self.session_id, text);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn synthesize_sentence(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    text: String,
    context_id: String,
    options: SynthesisOptions,
    delay_ms: u64,
    index: u32,
    chunk_tx: mpsc::Sender<(u32, AudioChunk)>,
    cancel: CancellationToken,
) {
    if delay_ms > 0 {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
    }

    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = synthesizer.synthesize(&text, &context_id, &options) => result,
    };

    // One-chunk lookahead so the real last chunk carries the final flag.
    let mut pending: Option<Vec<u8>> = None;
    match stream {
        Ok(mut audio) => loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return,
                item = audio.next() => item,
            };
            match item {
                Some(Ok(bytes)) => {
                    if let Some(prev) = pending.replace(bytes) {
                        let chunk = AudioChunk { bytes: prev, is_final: false };
                        if chunk_tx.send((index, chunk)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(index, error = %e, "synthesis stream error");
                    break;
                }
                None => break,
            }
        },
        Err(e) => {
            warn!(index, error = %e, "synthesis request failed");
        }
    }

    // Empty on failure; an empty final chunk still advances ordering.
    let last = pending.take().unwrap_or_default();
    let _ = chunk_tx.send((index, AudioChunk { bytes: last, is_final: true })).await;
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
