//! Bracket placeholder protocol.
//!
//! The generator is told to mark facts it cannot infer as `[Placeholder]`.
//! A placeholder is `[`, followed by the shortest run of non-newline
//! characters, followed by `]`. Brackets do not nest: in `[a [b] c]` the
//! token is `[a [b]`.
//!
//! Subject lines are blocked by any placeholder at all; bodies only by
//! placeholders whose text mentions one of [`UNRESOLVED_KEYWORDS`].

use std::sync::LazyLock;

use regex::Regex;

/// Lowercase substrings that mark a body placeholder as unresolved.
pub const UNRESOLVED_KEYWORDS: &[&str] = &[
    "date", "time", "name", "insert", "attach", "agenda", "link", "here",
];

const HIGHLIGHT_OPEN: &str =
    r#"<span style="background-color: #ffcccc; color: red; font-weight: bold;">"#;
const HIGHLIGHT_CLOSE: &str = "</span>";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]").expect("placeholder pattern is valid"));

/// Every bracketed token in `text`, brackets included, in order of appearance.
pub fn find_placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Bracketed tokens whose inner text contains an unresolved keyword.
/// Duplicates are kept as found.
pub fn find_unresolved(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .filter(|caps| is_unresolved(&caps[1]))
        .map(|caps| caps[0].to_string())
        .collect()
}

fn is_unresolved(inner: &str) -> bool {
    let lower = inner.to_lowercase();
    UNRESOLVED_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Bold every placeholder for display in the editor.
pub fn emphasize(text: &str) -> String {
    PLACEHOLDER.replace_all(text, "<b>$0</b>").into_owned()
}

/// Spans left by a previous [`highlight`] pass.
static HIGHLIGHTED: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"{}(\[.*?\]){}",
        regex::escape(HIGHLIGHT_OPEN),
        regex::escape(HIGHLIGHT_CLOSE)
    );
    Regex::new(&pattern).expect("highlight pattern is valid")
});

/// Wrap each placeholder found in `tokens` in the attention style.
///
/// Idempotent: tokens already wrapped by a previous pass are unwrapped first.
/// Matching goes through the placeholder pattern in a single pass, so a token
/// that contains another one is still wrapped whole.
pub fn highlight(html: &str, tokens: &[String]) -> String {
    let plain = HIGHLIGHTED.replace_all(html, "$1");
    PLACEHOLDER
        .replace_all(&plain, |caps: &regex::Captures| {
            let token = &caps[0];
            if tokens.iter().any(|t| t == token) {
                format!("{HIGHLIGHT_OPEN}{token}{HIGHLIGHT_CLOSE}")
            } else {
                token.to_string()
            }
        })
        .into_owned()
}
