// clean.rs — Input normalization and sentence splitting.
//
// Both functions are pure; the engine runs them before and after embedding.

/// Punctuation that survives cleaning.
const KEPT_PUNCTUATION: &[char] = &['.', ',', '!', '?', '-'];

/// Sentence terminators. Runs of these end one sentence.
const TERMINATORS: &[char] = &['.', '!', '?'];

fn is_kept(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c.is_whitespace() || KEPT_PUNCTUATION.contains(&c)
}

/// Normalize free-form text before embedding.
///
/// Drops everything except word characters, whitespace and `. , ! ? -`,
/// folds a repeated terminator (`!!` → `!`), collapses whitespace runs to a
/// single space and trims. Stripping happens first so removed symbols never
/// leave double spaces behind, which keeps `clean` idempotent.
pub fn clean(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().filter(|&c| is_kept(c)) {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            if !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
        } else if TERMINATORS.contains(&c) && out.ends_with(c) {
            continue;
        }
        out.push(c);
    }

    out
}

/// Split on runs of `.`, `!` or `?`, trimming pieces and dropping empty ones.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    text.split(|c: char| TERMINATORS.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
