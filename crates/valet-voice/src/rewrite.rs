//! Text-to-speech friendliness rewriting for voice-only devices.
//!
//! Screenless sessions get a pass that strips markdown markup and expands
//! the written shorthand a language model habitually emits. This is
//! deliberately shallow; prompt instructions do most of the work, this
//! catches the leftovers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Written shorthand → spoken form.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("e.g.", "for example"),
    ("i.e.", "that is"),
    ("etc.", "and so on"),
    ("vs.", "versus"),
    ("approx.", "approximately"),
    (" & ", " and "),
    ("%", " percent"),
];

static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]*)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]*)\*").unwrap());
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*]\s+").unwrap());

/// Rewrite one sentence for spoken delivery.
pub fn rewrite_for_voice(text: &str) -> String {
    let mut out = text.to_string();

    out = INLINE_CODE_RE.replace_all(&out, "$1").into_owned();
    out = BOLD_RE.replace_all(&out, "$1").into_owned();
    out = ITALIC_RE.replace_all(&out, "$1").into_owned();
    out = HEADING_RE.replace_all(&out, "").into_owned();
    out = BULLET_RE.replace_all(&out, "").into_owned();

    for (written, spoken) in SUBSTITUTIONS {
        out = out.replace(written, spoken);
    }

    collapse_spaces(&out)
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(c);
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
