use std::sync::LazyLock;

use regex::Regex;

use crate::placeholder;

const STYLED_OPEN: &str =
    r#"<div style="font-family: 'Calibri', 'Arial', sans-serif; font-size: 11pt; color: #000000;">"#;
const STYLED_CLOSE: &str = "</div>";

static BR_VARIANTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br pattern is valid"));
static P_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<p(\s[^>]*)?>").expect("p pattern is valid"));
static BR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<br>\s*){2,}").expect("br run pattern is valid"));

/// Prepare generated text for the rich-text editor.
///
/// The signature (if any) is appended once after a blank line, placeholders
/// are bolded and newlines become `<br>`.
pub fn format_for_editor(body: &str, signature: Option<&str>) -> String {
    let mut text = body.to_string();
    if let Some(sig) = signature.filter(|s| !s.trim().is_empty()) {
        text.push_str("\n\n");
        text.push_str(sig);
    }
    placeholder::emphasize(&text).replace("\r\n", "\n").replace('\n', "<br>")
}

/// Normalize editor HTML for sending.
///
/// Empty paragraphs collapse, paragraph boundaries become `<br>`, runs of
/// two or more breaks become exactly `<br><br>`, and leading/trailing breaks
/// are trimmed.
pub fn clean_body_html(html: &str) -> String {
    let body = BR_VARIANTS.replace_all(html, "<br>");
    let body = body.replace("<p><br></p>", "<br>").replace("<p></p>", "");
    let body = P_OPEN.replace_all(&body, "");
    let body = body.replace("</p>", "<br>");
    let body = BR_RUN.replace_all(&body, "<br><br>");

    let mut body = body.trim();
    loop {
        let before = body.len();
        body = body.trim_start_matches("<br>").trim_end_matches("<br>").trim();
        if body.len() == before {
            break;
        }
    }
    body.to_string()
}

/// Wrap a cleaned body in the fixed-font container used for outgoing mail.
pub fn wrap_styled(body: &str) -> String {
    format!("{STYLED_OPEN}\n{body}\n{STYLED_CLOSE}")
}

/// Render editor HTML to plain text, e.g. for prompting the generator.
///
/// Plain input (no markup) is returned trimmed but otherwise untouched.
pub fn html_to_plain(content: &str) -> String {
    if !content.contains('<') {
        return content.trim().to_string();
    }
    html_safe_md::render_email_plain(None, Some(content))
}
