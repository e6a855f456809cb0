//! Detection of the inline image-generation directive.
//!
//! Assistant models signal an image request by embedding the literal marker
//! `[GEN_IMG]` followed by a prompt in their own output text. The prompt runs
//! up to the first literal `.` or the end of the text, and may span lines.

use std::sync::OnceLock;

use regex::Regex;

/// Case-insensitive, dot-matches-newline. The lazy capture stops at the first
/// literal period, so prompts containing one ("a 3.5 foot tall robot")
/// truncate there. Known limitation, kept for compatibility with the models
/// prompted to emit this syntax — see DESIGN.md.
const DIRECTIVE_PATTERN: &str = r"(?is)\[GEN_IMG\]\s*(.+?)(?:\.|$)";

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DIRECTIVE_PATTERN).expect("directive pattern is valid"))
}

/// Parse the first `[GEN_IMG]` directive out of `text`.
///
/// Returns `(cleaned_text, prompt)`. Without a marker the text comes back
/// unchanged with `None`. With one, the cleaned text is the input minus the
/// whole matched span (marker, prompt, and terminating period), trimmed, and
/// the prompt is the captured run trimmed of surrounding whitespace. The
/// prompt may be empty; the caller decides whether that is actionable.
pub fn parse(text: &str) -> (String, Option<String>) {
    let re = directive_regex();

    let Some(captures) = re.captures(text) else {
        return (text.to_string(), None);
    };

    let prompt = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let whole = captures.get(0).expect("group 0 always present");
    let mut cleaned = String::with_capacity(text.len());
    cleaned.push_str(&text[..whole.start()]);
    cleaned.push_str(&text[whole.end()..]);

    (cleaned.trim().to_string(), Some(prompt))
}
