//! Ordered playback sequencing for concurrently synthesized sentences.
//!
//! Sentences are synthesized in parallel and finish out of order; devices
//! must hear them in order. The sequencer holds a cursor at the sentence
//! currently allowed to play: chunks for that sentence pass straight
//! through, chunks for later sentences are buffered until every earlier
//! sentence has delivered its final chunk. A failed sentence still delivers
//! an empty final chunk upstream, so the cursor never wedges.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

/// One piece of synthesized audio for a sentence.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    pub bytes: Vec<u8>,
    /// Last chunk of its sentence.
    pub is_final: bool,
}

pub struct PlaybackSequencer {
    cursor: u32,
    /// Chunks for sentences ahead of the cursor, in arrival order.
    buffered: BTreeMap<u32, Vec<AudioChunk>>,
    /// How far past the cursor a sentence may buffer before being dropped.
    max_ahead: u32,
    /// Sentences whose audio was shed past the look-ahead window but whose
    /// final chunk was seen. The cursor still has to pass them.
    shed_finals: BTreeSet<u32>,
    /// Total sentence count, known once the response stream ends.
    total: Option<u32>,
}

impl PlaybackSequencer {
    pub fn new(max_ahead: u32) -> Self {
        PlaybackSequencer {
            cursor: 0,
            buffered: BTreeMap::new(),
            max_ahead,
            shed_finals: BTreeSet::new(),
            total: None,
        }
    }

    /// Accept one chunk; returns every chunk now cleared to play, in order.
    pub fn on_chunk(&mut self, index: u32, chunk: AudioChunk) -> Vec<(u32, AudioChunk)> {
        if index < self.cursor {
            // Stale chunk from a sentence already completed or abandoned.
            return Vec::new();
        }

        let mut cleared = Vec::new();
        if index == self.cursor {
            let finished = chunk.is_final;
            cleared.push((index, chunk));
            if finished {
                self.advance(&mut cleared);
            }
            return cleared;
        }

        if index - self.cursor > self.max_ahead {
            warn!(index, cursor = self.cursor, "sentence too far ahead, dropping audio");
            // Only the bytes are shed; the completion still counts, or the
            // cursor could never pass this sentence.
            if chunk.is_final {
                self.shed_finals.insert(index);
            }
            return Vec::new();
        }
        self.buffered.entry(index).or_default().push(chunk);
        Vec::new()
    }

    /// The response stream has ended; `total` sentences were dispatched.
    pub fn set_total(&mut self, total: u32) {
        self.total = Some(total);
    }

    /// Every dispatched sentence has fully played.
    pub fn is_complete(&self) -> bool {
        self.total.map(|t| self.cursor >= t).unwrap_or(false)
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Move past a finished sentence and release buffered successors. A
    /// buffered successor whose final chunk already arrived releases the
    /// one after it too.
    fn advance(&mut self, cleared: &mut Vec<(u32, AudioChunk)>) {
        self.cursor += 1;
        loop {
            if self.shed_finals.remove(&self.cursor) {
                self.cursor += 1;
                continue;
            }
            let Some(chunks) = self.buffered.remove(&self.cursor) else {
                break;
            };
            let finished = chunks.iter().any(|c| c.is_final);
            cleared.extend(chunks.into_iter().map(|c| (self.cursor, c)));
            if !finished {
                // Still streaming; its remaining chunks now pass through live.
                break;
            }
            self.cursor += 1;
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
