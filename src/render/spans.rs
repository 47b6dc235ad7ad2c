//! Rich-text span reconstruction.
//!
//! Spans are resolved into markup once, at message ingestion, before any
//! price token substitution. Offsets and lengths count decoded characters,
//! not bytes.

/// Rich-text decoration over a plain-text range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattingSpan {
    pub offset: usize,
    pub length: usize,
    pub style: SpanStyle,
}

/// Supported span styles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStyle {
    Bold,
    Italic,
    Link(String),
}

impl SpanStyle {
    fn wrap(&self, body: &str) -> String {
        match self {
            SpanStyle::Bold => format!("<b>{}</b>", body),
            SpanStyle::Italic => format!("<i>{}</i>", body),
            SpanStyle::Link(target) => format!("<a href=\"{}\">{}</a>", target, body),
        }
    }
}

/// Reconstruct a plain text into markup by wrapping each span's substring
/// and concatenating the untouched gaps in between.
///
/// Spans are expected in non-decreasing offset order. A span starting
/// before the current write cursor overlaps an already emitted one and is
/// skipped entirely — first-applied wins. A span reaching past the end of
/// the text is clamped to it.
pub fn format_spans(text: &str, spans: &[FormattingSpan]) -> String {
    if spans.is_empty() {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for span in spans {
        if span.offset < cursor || span.offset >= chars.len() {
            continue;
        }

        let end = span.offset.saturating_add(span.length).min(chars.len());
        out.extend(&chars[cursor..span.offset]);

        let body: String = chars[span.offset..end].iter().collect();
        out.push_str(&span.style.wrap(&body));

        cursor = end;
    }

    if cursor < chars.len() {
        out.extend(&chars[cursor..]);
    }

    out
}
