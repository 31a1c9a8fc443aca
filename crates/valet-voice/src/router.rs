//! Streaming delivery-tag router.
//!
//! Model output is a single text stream with inline delivery tags:
//! `[VOICE]`, `[DISPLAY]`, `[ACTION]`, and `[ARTIFACT …]…[/ARTIFACT]`.
//! Tags can be split across chunks at any byte, so the router is a per-char
//! state machine. Untagged output (a model that ignores the format) passes
//! through as voice, so the assistant never goes silent on malformed output.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use valet_core::types::ArtifactMeta;

/// A possible tag is abandoned and replayed as literal text past this size.
const TAG_BUFFER_LIMIT: usize = 200;

/// `key="value"` pairs inside an ARTIFACT open tag.
static ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());

/// Where routed text is currently going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    /// No tag seen yet; text is spoken.
    Passthrough,
    Voice,
    Display,
    Action,
    Artifact,
}

/// Routed output produced by [`DeliveryRouter::push`].
#[derive(Clone, Debug, PartialEq)]
pub enum RouterEvent {
    Voice(String),
    Display(String),
    Action(String),
    Artifact { content: String, meta: ArtifactMeta },
}

/// Per-char streaming router. One instance per model response.
pub struct DeliveryRouter {
    channel: Channel,
    /// Text accumulated since `[`, while it might still be a tag.
    tag_buffer: Option<String>,
    artifact_buffer: String,
    artifact_meta: ArtifactMeta,
}

impl Default for DeliveryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryRouter {
    pub fn new() -> Self {
        DeliveryRouter {
            channel: Channel::Passthrough,
            tag_buffer: None,
            artifact_buffer: String::new(),
            artifact_meta: ArtifactMeta::default(),
        }
    }

    /// Feed one chunk; returns the routed events it produced.
    ///
    /// Consecutive text on one channel within a chunk is batched into a
    /// single event.
    pub fn push(&mut self, chunk: &str) -> Vec<RouterEvent> {
        let mut out = Out::new(self.channel);

        for c in chunk.chars() {
            if let Some(buf) = self.tag_buffer.as_mut() {
                match c {
                    ']' => {
                        let tag = self.tag_buffer.take().unwrap_or_default();
                        self.interpret_tag(&tag, &mut out);
                    }
                    '[' => {
                        // Previous '[' was literal text after all.
                        let literal = format!("[{}", self.tag_buffer.take().unwrap_or_default());
                        self.emit_text(&literal, &mut out);
                        self.tag_buffer = Some(String::new());
                    }
                    _ => {
                        buf.push(c);
                        if buf.len() > TAG_BUFFER_LIMIT {
                            let literal =
                                format!("[{}", self.tag_buffer.take().unwrap_or_default());
                            self.emit_text(&literal, &mut out);
                        }
                    }
                }
            } else if c == '[' {
                self.tag_buffer = Some(String::new());
            } else {
                self.emit_char(c, &mut out);
            }
        }

        out.finish()
    }

    /// End of stream: replay any dangling tag as literal text and deliver an
    /// unterminated artifact rather than dropping it.
    pub fn flush(&mut self) -> Vec<RouterEvent> {
        let mut out = Out::new(self.channel);

        if let Some(buf) = self.tag_buffer.take() {
            let literal = format!("[{buf}");
            self.emit_text(&literal, &mut out);
        }

        let mut events = out.finish();
        if self.channel == Channel::Artifact && !self.artifact_buffer.trim().is_empty() {
            debug!("unterminated artifact at end of stream");
            events.push(RouterEvent::Artifact {
                content: std::mem::take(&mut self.artifact_buffer),
                meta: self.artifact_meta.clone(),
            });
            self.channel = Channel::Voice;
        }
        events
    }

    fn interpret_tag(&mut self, tag: &str, out: &mut Out) {
        match tag {
            "VOICE" => self.switch_channel(Channel::Voice, out),
            "DISPLAY" => self.switch_channel(Channel::Display, out),
            "ACTION" => self.switch_channel(Channel::Action, out),
            "/ARTIFACT" if self.channel == Channel::Artifact => {
                out.push_event(RouterEvent::Artifact {
                    content: std::mem::take(&mut self.artifact_buffer),
                    meta: self.artifact_meta.clone(),
                });
                self.channel = Channel::Voice;
                out.channel = Channel::Voice;
            }
            _ if tag == "ARTIFACT" || tag.starts_with("ARTIFACT ") => {
                self.artifact_meta = parse_artifact_attrs(tag);
                self.artifact_buffer.clear();
                self.switch_channel(Channel::Artifact, out);
            }
            _ => {
                // Unknown tag: it was literal text, brackets and all.
                self.emit_text(&format!("[{tag}]"), out);
            }
        }
    }

    fn switch_channel(&mut self, channel: Channel, out: &mut Out) {
        out.flush_pending();
        self.channel = channel;
        out.channel = channel;
    }

    fn emit_text(&mut self, text: &str, out: &mut Out) {
        for c in text.chars() {
            self.emit_char(c, out);
        }
    }

    fn emit_char(&mut self, c: char, out: &mut Out) {
        if self.channel == Channel::Artifact {
            self.artifact_buffer.push(c);
        } else {
            out.push_char(c);
        }
    }
}

/// Per-push event accumulator; batches consecutive same-channel text.
struct Out {
    channel: Channel,
    pending: String,
    events: Vec<RouterEvent>,
}

impl Out {
    fn new(channel: Channel) -> Self {
        Out {
            channel,
            pending: String::new(),
            events: Vec::new(),
        }
    }

    fn push_char(&mut self, c: char) {
        self.pending.push(c);
    }

    fn push_event(&mut self, event: RouterEvent) {
        self.flush_pending();
        self.events.push(event);
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        let event = match self.channel {
            Channel::Passthrough | Channel::Voice => RouterEvent::Voice(text),
            Channel::Display => RouterEvent::Display(text),
            Channel::Action => RouterEvent::Action(text),
            // Artifact text never reaches the accumulator.
            Channel::Artifact => return,
        };
        self.events.push(event);
    }

    fn finish(mut self) -> Vec<RouterEvent> {
        self.flush_pending();
        self.events
    }
}

fn parse_artifact_attrs(tag: &str) -> ArtifactMeta {
    let mut meta = ArtifactMeta::default();
    for cap in ATTR_RE.captures_iter(tag) {
        match &cap[1] {
            "type" => meta.artifact_type = cap[2].to_string(),
            "title" => meta.title = cap[2].to_string(),
            "language" => meta.language = Some(cap[2].to_string()),
            other => debug!(attr = other, "ignoring unknown artifact attribute"),
        }
    }
    meta
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
