//! Incremental sentence boundary detection over a token stream.
//!
//! Tokens arrive in arbitrary-sized chunks; the detector buffers them and
//! emits complete sentences as soon as a boundary is confirmed. The split
//! points are identical regardless of how the same text is chunked, because
//! every call rescans the whole unconsumed buffer.

use once_cell::sync::Lazy;
use regex::Regex;

/// Periods after these words never end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "dr.", "mr.", "mrs.", "ms.", "prof.", "sr.", "jr.", "st.", "vs.", "e.g.", "i.e.", "etc.",
    "inc.", "ltd.", "no.", "dept.", "approx.",
];

/// Digits on both sides of a period, e.g. "3.14".
static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d\.\d").unwrap());

/// Letter-dot-letter-dot, e.g. "U.S." or "a.m.".
static ACRONYM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]\.[A-Za-z]\.").unwrap());

/// Streaming sentence splitter.
#[derive(Default)]
pub struct SentenceDetector {
    buffer: String,
}

impl SentenceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of text; returns every sentence completed by it.
    ///
    /// A single chunk can complete zero, one, or several sentences.
    pub fn add_token(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut sentences = Vec::new();
        while let Some(end) = self.find_boundary() {
            let remainder = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, String::new());
            self.buffer = remainder.trim_start().to_string();

            let sentence = sentence.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
        }
        sentences
    }

    /// Emit whatever is left in the buffer as a final (possibly unterminated)
    /// sentence. Call at end of stream.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    /// Byte offset just past the first confirmed sentence boundary, if any.
    fn find_boundary(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            // A boundary needs trailing whitespace; a terminator at the very
            // end of the buffer may still be mid-token ("3." → "3.14").
            let followed_by_space = match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => false,
            };
            if !followed_by_space {
                continue;
            }

            let end = i + c.len_utf8();
            let candidate = &self.buffer[..end];
            if c == '.' && Self::is_false_boundary(candidate) {
                continue;
            }
            return Some(end);
        }
        None
    }

    fn is_false_boundary(candidate: &str) -> bool {
        if let Some(last_word) = candidate.split_whitespace().last() {
            if ABBREVIATIONS.contains(&last_word.to_lowercase().as_str()) {
                return true;
            }
        }

        // "3.14." — decimal right before the terminator.
        let without_dot = &candidate[..candidate.len() - 1];
        if DECIMAL_RE.is_match(char_tail(without_dot, 4)) {
            return true;
        }

        // "U.S." style acronyms.
        if ACRONYM_RE.is_match(char_tail(candidate, 5)) {
            return true;
        }

        false
    }
}

/// Last `n` characters of a string, unicode-safe.
fn char_tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    let (idx, _) = s.char_indices().nth(skip).unwrap_or((0, ' '));
    &s[idx..]
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(detector: &mut SentenceDetector, text: &str) -> Vec<String> {
        detector.add_token(text)
    }

    fn feed_char_by_char(text: &str) -> Vec<String> {
        let mut detector = SentenceDetector::new();
        let mut out = Vec::new();
        for c in text.chars() {
            out.extend(detector.add_token(&c.to_string()));
        }
        out.extend(detector.flush());
        out
    }

    #[test]
    fn test_single_sentence_needs_trailing_space() {
        let mut d = SentenceDetector::new();
        assert!(d.add_token("Hello there.").is_empty());
        let out = d.add_token(" ");
        assert_eq!(out, vec!["Hello there."]);
    }

    #[test]
    fn test_multiple_sentences_in_one_chunk() {
        let mut d = SentenceDetector::new();
        let out = feed_all(&mut d, "First one. Second one! Third one? Tail");
        assert_eq!(out, vec!["First one.", "Second one!", "Third one?"]);
        assert_eq!(d.flush(), Some("Tail".to_string()));
    }

    #[test]
    fn test_chunking_does_not_change_splits() {
        let text = "Good morning, sir. The forecast calls for rain. Bring an umbrella. ";
        let whole = {
            let mut d = SentenceDetector::new();
            let mut out = d.add_token(text);
            out.extend(d.flush());
            out
        };
        let charwise = feed_char_by_char(text);
        assert_eq!(whole, charwise);
        assert_eq!(whole.len(), 3);
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let mut d = SentenceDetector::new();
        let out = feed_all(&mut d, "Dr. Smith arrived early. ");
        assert_eq!(out, vec!["Dr. Smith arrived early."]);
    }

    #[test]
    fn test_latin_abbreviations() {
        let mut d = SentenceDetector::new();
        let out = feed_all(&mut d, "Try a citrus, e.g. a lime, for contrast. ");
        assert_eq!(out, vec!["Try a citrus, e.g. a lime, for contrast."]);
    }

    #[test]
    fn test_decimals_do_not_split() {
        let mut d = SentenceDetector::new();
        let out = feed_all(&mut d, "Temperature is 21.5 degrees. The total came to 3.14. Thanks. ");
        assert_eq!(
            out,
            vec!["Temperature is 21.5 degrees.", "The total came to 3.14. Thanks."]
        );
    }

    #[test]
    fn test_acronyms_do_not_split() {
        let mut d = SentenceDetector::new();
        let out = feed_all(&mut d, "The U.S. markets opened higher today. ");
        assert_eq!(out, vec!["The U.S. markets opened higher today."]);
    }

    #[test]
    fn test_exclamation_and_question() {
        let out = feed_char_by_char("Stop! Why? Because. ");
        assert_eq!(out, vec!["Stop!", "Why?", "Because."]);
    }

    #[test]
    fn test_flush_empty_buffer() {
        let mut d = SentenceDetector::new();
        assert_eq!(d.flush(), None);
        d.add_token("   ");
        assert_eq!(d.flush(), None);
    }

    #[test]
    fn test_flush_unterminated_tail() {
        let mut d = SentenceDetector::new();
        assert_eq!(d.add_token("Done. And one more thing"), vec!["Done."]);
        assert_eq!(d.add_token(""), Vec::<String>::new());
        assert_eq!(d.add_token(" "), Vec::<String>::new());
        assert_eq!(d.flush(), Some("And one more thing".to_string()));
    }

    #[test]
    fn test_unicode_text() {
        let mut d = SentenceDetector::new();
        let out = feed_all(&mut d, "C'est fini. Très bien! ");
        assert_eq!(out, vec!["C'est fini.", "Très bien!"]);
    }
}
