//! Reducing HTML to readable text.

use scraper::{Html, Selector};

const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "head"];

/// Returns the visible text of an HTML document.
///
/// Text nodes under `script`, `style` and similar elements are dropped, the
/// remaining fragments are trimmed and joined with single spaces.
#[must_use]
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

/// Truncates `text` to at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_text_skips_scripts_and_styles() {
        let html = r"
            <html>
              <head><title>Ignored</title><style>body { color: red }</style></head>
              <body>
                <h1>Point guards</h1>
                <script>var tracking = 1;</script>
                <p>Average age is <b>27.4</b> years.</p>
                <noscript>Enable JS</noscript>
              </body>
            </html>";
        assert_eq!(extract_text(html), "Point guards Average age is 27.4 years.");
    }

    #[test]
    fn test_extract_text_without_body_tag() {
        assert_eq!(extract_text("<p>bare fragment</p>"), "bare fragment");
    }

    #[test]
    fn test_extract_text_empty_page() {
        assert_eq!(extract_text("<html><body><script>x()</script></body></html>"), "");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("🦀🦀🦀", 2), "🦀🦀");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
