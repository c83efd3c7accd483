//! Inline text codec: Markdown inline markup <-> styled text elements.
//!
//! Decoding is a single left-to-right scan over an ordered alternation, so at
//! any position bold-italic beats bold, bold beats italic, and so on down to
//! links. The inner text of emphasis, strikethrough and links is decoded
//! again and the outer style is folded onto every element produced.

use crate::block::{Link, TextElement, TextStyle};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?P<bold_italic>\*\*\*(?P<bi_text>.+?)\*\*\*)",
        r"|(?P<bold>\*\*(?P<b_text>.+?)\*\*)",
        r"|(?P<italic>\*(?P<i_text>.+?)\*)",
        r"|(?P<strikethrough>~~(?P<s_text>.+?)~~)",
        r"|(?P<inline_code>`(?P<c_text>[^`]+?)`)",
        r"|(?P<link>\[(?P<l_text>[^\]]*?)\]\((?P<l_url>[^)]+?)\))",
    ))
    .expect("inline pattern is valid")
});

/// Decodes inline Markdown into elements.
///
/// The empty string decodes to no elements; any other input yields at least
/// one element.
pub fn decode(text: &str) -> Vec<TextElement> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut elements = Vec::new();
    let mut last = 0;
    for caps in INLINE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            elements.push(TextElement::plain(&text[last..whole.start()]));
        }
        elements.extend(decode_match(&caps));
        last = whole.end();
    }
    if last < text.len() {
        elements.push(TextElement::plain(&text[last..]));
    }
    if elements.is_empty() {
        elements.push(TextElement::plain(text));
    }
    elements
}

fn decode_match(caps: &Captures<'_>) -> Vec<TextElement> {
    if let Some(inner) = caps.name("bi_text") {
        return nested(
            inner.as_str(),
            &TextStyle {
                bold: true,
                italic: true,
                ..TextStyle::default()
            },
        );
    }
    if let Some(inner) = caps.name("b_text") {
        return nested(
            inner.as_str(),
            &TextStyle {
                bold: true,
                ..TextStyle::default()
            },
        );
    }
    if let Some(inner) = caps.name("i_text") {
        return nested(
            inner.as_str(),
            &TextStyle {
                italic: true,
                ..TextStyle::default()
            },
        );
    }
    if let Some(inner) = caps.name("s_text") {
        return nested(
            inner.as_str(),
            &TextStyle {
                strikethrough: true,
                ..TextStyle::default()
            },
        );
    }
    if let Some(code) = caps.name("c_text") {
        return vec![TextElement::run(
            code.as_str(),
            TextStyle {
                inline_code: true,
                ..TextStyle::default()
            },
        )];
    }
    if let (Some(label), Some(url)) = (caps.name("l_text"), caps.name("l_url")) {
        let label = match label.as_str() {
            "" => url.as_str(),
            label => label,
        };
        return nested(
            label,
            &TextStyle {
                link: Some(Link {
                    url: url.as_str().to_string(),
                }),
                ..TextStyle::default()
            },
        );
    }
    Vec::new()
}

fn nested(inner: &str, outer: &TextStyle) -> Vec<TextElement> {
    let mut elements = decode(inner);
    if elements.is_empty() {
        elements.push(TextElement::plain(inner));
    }
    for element in &mut elements {
        if let Some(run) = element.text_run.as_mut() {
            run.text_element_style.merge(outer);
        }
    }
    elements
}

/// Encodes elements back into inline Markdown.
///
/// Adjacent runs with identical style are coalesced first so that the
/// markers of one run never abut the markers of the next.
pub fn encode(elements: &[TextElement]) -> String {
    let mut out = String::new();
    let mut pending: Option<(String, TextStyle)> = None;
    for element in elements {
        match &element.text_run {
            Some(run) => {
                if let Some((content, style)) = pending.as_mut() {
                    if *style == run.text_element_style {
                        content.push_str(&run.content);
                        continue;
                    }
                    out.push_str(&encode_run(content, style));
                }
                pending = Some((run.content.clone(), run.text_element_style.clone()));
            }
            None => {
                if let Some((content, style)) = pending.take() {
                    out.push_str(&encode_run(&content, &style));
                }
                out.push_str(element.fallback_text().unwrap_or_default());
            }
        }
    }
    if let Some((content, style)) = pending {
        out.push_str(&encode_run(&content, &style));
    }
    out
}

fn encode_run(content: &str, style: &TextStyle) -> String {
    if content.is_empty() {
        return String::new();
    }
    let marked = if style.inline_code {
        format!("`{content}`")
    } else {
        // Emphasis markers must hug non-space text, so edge whitespace is
        // kept outside them.
        let core = content.trim();
        if core.is_empty() {
            return content.to_string();
        }
        let start = content.len() - content.trim_start().len();
        let end = start + core.len();
        let mut wrapped = match (style.bold, style.italic) {
            (true, true) => format!("***{core}***"),
            (true, false) => format!("**{core}**"),
            (false, true) => format!("*{core}*"),
            (false, false) => core.to_string(),
        };
        if style.strikethrough {
            wrapped = format!("~~{wrapped}~~");
        }
        format!("{}{wrapped}{}", &content[..start], &content[end..])
    };
    match style.link_url() {
        Some(url) => format!("[{marked}]({url})"),
        None => marked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn style_of(element: &TextElement) -> TextStyle {
        element.style().cloned().unwrap_or_default()
    }

    #[test]
    fn test_empty_decodes_to_nothing() {
        assert!(decode("").is_empty());
    }

    #[test]
    fn test_plain_text_is_one_element() {
        let elements = decode("just words");
        assert_eq!(elements, vec![TextElement::plain("just words")]);
    }

    #[test]
    fn test_bold_with_nested_italic() {
        let elements = decode("**bold *and* more**");
        assert_eq!(elements.len(), 3);
        assert!(elements.iter().all(|e| style_of(e).bold));
        assert!(!style_of(&elements[0]).italic);
        assert!(style_of(&elements[1]).italic);
        assert!(!style_of(&elements[2]).italic);
        assert_eq!(elements[1].content(), Some("and"));
    }

    #[test]
    fn test_bold_italic_beats_bold() {
        let elements = decode("***both***");
        assert_eq!(elements.len(), 1);
        let style = style_of(&elements[0]);
        assert!(style.bold && style.italic);
        assert_eq!(elements[0].content(), Some("both"));
    }

    #[test]
    fn test_code_span_is_not_recursed() {
        let elements = decode("`**raw**`");
        assert_eq!(elements.len(), 1);
        let style = style_of(&elements[0]);
        assert!(style.inline_code);
        assert!(!style.bold);
        assert_eq!(elements[0].content(), Some("**raw**"));
    }

    #[test]
    fn test_emphasis_inside_link_text() {
        let elements = decode("see [**docs**](https://example.com)");
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].content(), Some("see "));
        let style = style_of(&elements[1]);
        assert!(style.bold);
        assert_eq!(style.link_url(), Some("https://example.com"));
    }

    #[test]
    fn test_code_adjacent_to_emphasis() {
        let elements = decode("`a`*b*");
        assert_eq!(elements.len(), 2);
        assert!(style_of(&elements[0]).inline_code);
        assert!(style_of(&elements[1]).italic);
        assert!(!style_of(&elements[1]).inline_code);
    }

    #[test]
    fn test_strikethrough_and_trailing_text() {
        let elements = decode("~~old~~ new");
        assert_eq!(elements.len(), 2);
        assert!(style_of(&elements[0]).strikethrough);
        assert_eq!(elements[1].content(), Some(" new"));
    }

    #[test]
    fn test_unclosed_marker_stays_plain() {
        let elements = decode("2 * 3 = 6");
        assert_eq!(elements, vec![TextElement::plain("2 * 3 = 6")]);
    }

    #[test]
    fn test_encode_marker_order() {
        let style = TextStyle {
            bold: true,
            italic: true,
            strikethrough: true,
            link: Some(Link { url: "u".into() }),
            ..TextStyle::default()
        };
        assert_eq!(encode(&[TextElement::run("x", style)]), "[~~***x***~~](u)");
    }

    #[test]
    fn test_encode_inline_code_is_exclusive() {
        let style = TextStyle {
            bold: true,
            inline_code: true,
            ..TextStyle::default()
        };
        assert_eq!(encode(&[TextElement::run("x", style)]), "`x`");
    }

    #[test]
    fn test_encode_keeps_edge_whitespace_outside_markers() {
        let bold = TextStyle {
            bold: true,
            ..TextStyle::default()
        };
        let elements = vec![
            TextElement::run("bold ", bold.clone()),
            TextElement::plain("x"),
        ];
        assert_eq!(encode(&elements), "**bold** x");
    }

    #[test]
    fn test_encode_coalesces_equal_styles() {
        let bold = TextStyle {
            bold: true,
            ..TextStyle::default()
        };
        let elements = vec![
            TextElement::run("a", bold.clone()),
            TextElement::run("b", bold),
        ];
        assert_eq!(encode(&elements), "**ab**");
    }

    #[test]
    fn test_encode_fallback_and_empty_runs() {
        let mention: TextElement =
            serde_json::from_value(json!({"mention_user": {"content": "@sam"}})).unwrap();
        let elements = vec![TextElement::plain("hi "), mention, TextElement::plain("")];
        assert_eq!(encode(&elements), "hi @sam");
    }

    #[test]
    fn test_canonical_inline_round_trips() {
        for source in [
            "plain",
            "a **b** c",
            "*i* and `code` and ~~s~~",
            "[link](http://x.y/z) tail",
            "**bold** ***and*** **more**",
        ] {
            assert_eq!(encode(&decode(source)), source, "source: {source}");
        }
    }
}
