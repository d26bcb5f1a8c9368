//! Markup handling for plain-text channels

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[a-zA-Z/!][^>]*>").expect("valid tag regex"));
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>|</h[1-6]>").expect("valid break regex"));
static BOLD_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:b|strong)(?:\s[^>]*)?>(.*?)</(?:b|strong)>").expect("valid bold regex")
});
static ITALIC_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:i|em)(?:\s[^>]*)?>(.*?)</(?:i|em)>").expect("valid italic regex")
});
static MARKDOWN_BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("valid markdown bold regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// True when the body carries HTML tags.
pub fn has_markup(body: &str) -> bool {
    TAG.is_match(body)
}

/// Strip tags and decode the common entities.
pub fn to_plain_text(body: &str) -> String {
    let text = LINE_BREAK.replace_all(body, "\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

/// Convert markup to WhatsApp formatting: bold becomes `*text*`, italics `_text_`.
pub fn to_whatsapp(body: &str) -> String {
    let text = BOLD_TAG.replace_all(body, "*$1*");
    let text = ITALIC_TAG.replace_all(&text, "_${1}_");
    let text = MARKDOWN_BOLD.replace_all(&text, "*$1*");
    to_plain_text(&text)
}

/// Truncate to at most `max_chars` characters, ending with an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut truncated: String = text.chars().take(max_chars - 1).collect();
    truncated.push('…');
    truncated
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_markup() {
        assert!(has_markup("<p>Hello</p>"));
        assert!(has_markup("Hi <b>Asha</b>"));
        assert!(!has_markup("2 < 3 and 5 > 4"));
        assert!(!has_markup("plain text"));
    }

    #[test]
    fn test_to_plain_text() {
        let html = "<p>Your order <b>#1042</b> shipped.</p><p>Track it &amp; relax.</p>";
        assert_eq!(
            to_plain_text(html),
            "Your order #1042 shipped.\nTrack it & relax."
        );
    }

    #[test]
    fn test_to_whatsapp_bold() {
        assert_eq!(
            to_whatsapp("Flat <strong>50% off</strong> today, <em>only</em> online"),
            "Flat *50% off* today, _only_ online"
        );
        assert_eq!(to_whatsapp("**Sale** now"), "*Sale* now");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 5), "abcd…");
        // Multi-byte characters are counted, not bytes.
        assert_eq!(truncate_chars("नमस्ते दुनिया", 3).chars().count(), 3);
    }
}
