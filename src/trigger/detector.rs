//! Pure detector for the configured trigger phrase in comment text.
//!
//! The phrase (default `@claude`) is matched literally, case-insensitively,
//! and only at word boundaries: `@claude-bot` and `user@claude` don't count,
//! `hey @claude fix this` does. The free text after the first match becomes
//! the instruction passed to the assistant pipeline.

/// The result of scanning a note for the trigger phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    /// Whether the phrase was found at a valid word boundary.
    pub matched: bool,

    /// The trimmed text following the phrase; empty when nothing follows or
    /// when there was no match.
    pub instruction: String,
}

impl TriggerMatch {
    /// A non-match with an empty instruction.
    pub fn none() -> Self {
        TriggerMatch {
            matched: false,
            instruction: String::new(),
        }
    }
}

/// Scans `note` for the literal `phrase` at a word boundary.
///
/// # Matching rules
///
/// - Case-insensitive (ASCII), like GitLab mentions.
/// - The character before the match must be absent or non-alphanumeric, so
///   `user@claude` (an email-looking string) does not trigger.
/// - The character after the match must be absent or outside `[A-Za-z0-9_-]`,
///   so a phrase of `@claude` does not fire on `@claude-bot` or `@claudebot`.
/// - The instruction is everything after the phrase to end of string, trimmed;
///   the first occurrence at a valid boundary wins.
///
/// Pure function; no I/O.
pub fn detect(note: &str, phrase: &str) -> TriggerMatch {
    if phrase.is_empty() {
        return TriggerMatch::none();
    }

    let mut search_pos = 0;
    while search_pos < note.len() {
        let Some(rel) = find_ci(&note[search_pos..], phrase) else {
            break;
        };
        let start = search_pos + rel;
        let end = start + phrase.len();

        if left_boundary_ok(note, start) && right_boundary_ok(note, end) {
            return TriggerMatch {
                matched: true,
                instruction: note[end..].trim().to_string(),
            };
        }

        // Not a valid boundary; keep scanning after this candidate. Advance
        // by a full character so the next slice stays on a char boundary.
        let step = note[start..].chars().next().map_or(1, char::len_utf8);
        search_pos = start + step;
    }

    TriggerMatch::none()
}

/// Finds the first case-insensitive occurrence of `needle` in `haystack`,
/// returning its byte offset. Comparison is ASCII-case-insensitive; candidate
/// slices that would split a multi-byte character are skipped.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    for start in 0..=(haystack.len() - needle.len()) {
        if let Some(candidate) = haystack.get(start..start + needle.len()) {
            if candidate.eq_ignore_ascii_case(needle) {
                return Some(start);
            }
        }
    }
    None
}

/// The phrase must not be glued to a preceding alphanumeric character.
fn left_boundary_ok(note: &str, start: usize) -> bool {
    match note[..start].chars().next_back() {
        None => true,
        Some(prev) => !prev.is_alphanumeric(),
    }
}

/// The phrase must not be a prefix of a longer mention. `-` and `_` are
/// valid username characters on GitLab, so `@claude-bot` must not match a
/// phrase of `@claude`.
fn right_boundary_ok(note: &str, end: usize) -> bool {
    match note[end..].chars().next() {
        None => true,
        Some(next) => !(next.is_alphanumeric() || next == '-' || next == '_'),
    }
}
