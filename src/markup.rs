//! String-level helpers for the narrow HTML shapes this tool handles.

use std::borrow::Cow;
use std::sync::LazyLock;

use quick_xml::escape::resolve_html5_entity;
use regex::Regex;

/// Capability: turn a fragment into well-formed XHTML.
pub trait HtmlTidy: Send + Sync {
    fn tidy(&self, fragment: &str) -> anyhow::Result<String>;
}

/// Closes void elements and escapes ampersands that do not start a character reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTidy;

impl HtmlTidy for BasicTidy {
    fn tidy(&self, fragment: &str) -> anyhow::Result<String> {
        let closed = ensure_xhtml_void_tags(fragment);
        Ok(escape_stray_ampersands(&closed))
    }
}

static ENTITY_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").expect("static regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

pub fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Escapes text-node content. Quotes are kept as they are.
pub fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Decodes character references in scraped strings.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|&i| i <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let name = &tail[1..semi];
        let decoded = match name.strip_prefix('#') {
            Some(num) => {
                let code = match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                code.and_then(char::from_u32).map(String::from)
            }
            None => resolve_html5_entity(name).map(str::to_owned),
        };
        match decoded {
            Some(text) => {
                out.push_str(&text);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

pub fn escape_stray_ampersands(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    while let Some(rel) = input[cursor..].find('&') {
        let amp = cursor + rel;
        out.push_str(&input[cursor..amp]);
        if ENTITY_START.is_match(&input[amp..]) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        cursor = amp + 1;
    }
    out.push_str(&input[cursor..]);
    out
}

/// Drops every tag and decodes entities; used for plain-text views of chapters.
pub fn strip_tags(html: &str) -> String {
    let spaced = html
        .replace("</p>", "</p>\n")
        .replace("<br />", "\n")
        .replace("<br/>", "\n");
    let text = TAG.replace_all(&spaced, "");
    decode_entities(&text).into_owned()
}

pub fn ensure_xhtml_void_tags(html: &str) -> String {
    const VOID_TAGS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(rel_lt) = html[cursor..].find('<') {
        let lt = cursor + rel_lt;
        out.push_str(&html[cursor..lt]);

        let mut in_quote: Option<u8> = None;
        let mut gt = lt + 1;
        while gt < bytes.len() {
            let b = bytes[gt];
            if let Some(q) = in_quote {
                if b == q {
                    in_quote = None;
                }
                gt += 1;
                continue;
            }
            if b == b'"' || b == b'\'' {
                in_quote = Some(b);
                gt += 1;
                continue;
            }
            if b == b'>' {
                break;
            }
            gt += 1;
        }
        if gt >= bytes.len() {
            out.push_str(&html[lt..]);
            return out;
        }

        let raw_tag = &html[lt..=gt];
        if raw_tag
            .as_bytes()
            .get(1)
            .is_some_and(|b| matches!(b, b'!' | b'?' | b'/'))
        {
            out.push_str(raw_tag);
            cursor = gt + 1;
            continue;
        }

        let name_start = lt + 1;
        let mut name_end = name_start;
        while name_end < gt && (bytes[name_end] as char).is_ascii_alphanumeric() {
            name_end += 1;
        }
        let tag_name = html[name_start..name_end].to_ascii_lowercase();
        if tag_name.is_empty() || !VOID_TAGS.contains(&tag_name.as_str()) {
            out.push_str(raw_tag);
            cursor = gt + 1;
            continue;
        }

        let tag_without_gt = &html[lt..gt];
        if tag_without_gt.trim_end().ends_with('/') {
            out.push_str(raw_tag);
        } else {
            out.push_str(tag_without_gt.trim_end());
            out.push_str(" />");
        }
        cursor = gt + 1;
    }

    out.push_str(&html[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_tags_are_closed_without_touching_text() {
        let out = ensure_xhtml_void_tags("<p>日本語<br>x</p><img src=\"x.png\">");
        assert_eq!(out, "<p>日本語<br />x</p><img src=\"x.png\" />");
    }

    #[test]
    fn stray_ampersands_are_escaped() {
        let out = escape_stray_ampersands("Q&A &amp; &#160; &x");
        assert_eq!(out, "Q&amp;A &amp; &#160; &amp;x");
    }

    #[test]
    fn decode_entities_handles_numeric_and_named() {
        assert_eq!(
            decode_entities("a?b=1&amp;c=&#50;&#x33;"),
            "a?b=1&c=23"
        );
        assert_eq!(decode_entities("plain"), "plain");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("Wait&hellip; &Aring;"), "Wait\u{2026} \u{c5}");
    }

    #[test]
    fn text_escaping_leaves_quotes() {
        assert_eq!(escape_text("a < b & \"c\""), "a &lt; b &amp; \"c\"");
    }
}
