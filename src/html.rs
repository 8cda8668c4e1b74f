//! Streaming start-tag scan built on `lol_html`.
//!
//! Every element's `src` and `href` attributes are collected verbatim
//! (after entity unescaping), whatever the tag name. Nothing is validated:
//! `javascript:`, scheme-less or empty values are reported as they appear.
//! A valueless attribute reads as the empty string.

use lol_html::{element, HtmlRewriter, OutputSink, Settings};
use std::cell::RefCell;
use std::rc::Rc;

/// Attribute names (lowercase) whose values are treated as links.
const LINK_ATTRIBUTES: [&str; 2] = ["src", "href"];

/// Collect `src`/`href` values of every start tag in document order.
///
/// Malformed markup never fails the scan; values seen before a rewriter
/// error are still returned.
pub fn link_attributes(document: &str) -> Vec<String> {
    let values: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let values_handle = Rc::clone(&values);

    let handler = element!("*", move |el| {
        let mut entries = values_handle.borrow_mut();
        for attr in el.attributes() {
            let name = attr.name().to_ascii_lowercase();
            if !LINK_ATTRIBUTES.contains(&name.as_str()) {
                continue;
            }
            entries.push(unescape(&attr.value()));
        }
        Ok(())
    });

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![handler],
            strict: false,
            ..Settings::default()
        },
        NoopSink,
    );

    let outcome = rewriter
        .write(document.as_bytes())
        .and_then(|()| rewriter.end());
    if let Err(err) = outcome {
        tracing::debug!(error = %err, "html scan stopped early");
    }

    let collected = values.borrow().clone();
    collected
}

/// Decode the character references that commonly appear inside URLs.
fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.find(';').filter(|&end| end <= 10) {
            Some(end) => match decode_reference(&tail[1..end]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

struct NoopSink;

impl OutputSink for NoopSink {
    fn handle_chunk(&mut self, _chunk: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_src_and_href_from_any_tag() {
        let doc = r#"<html><head><link href="/style.css"><script src="app.js"></script></head>
            <body><a href="https://a.test/x">x</a><img src="pic.png"><div href="odd"></div></body></html>"#;
        assert_eq!(
            link_attributes(doc),
            vec!["/style.css", "app.js", "https://a.test/x", "pic.png", "odd"]
        );
    }

    #[test]
    fn test_attribute_names_case_insensitive() {
        let doc = r#"<A HREF="http://upper.test/">u</A><IMG Src="mixed.gif">"#;
        assert_eq!(
            link_attributes(doc),
            vec!["http://upper.test/", "mixed.gif"]
        );
    }

    #[test]
    fn test_ignores_other_attributes_and_text() {
        let doc = r#"<p data-href="nope">see http://text.test/ here</p><form action="/post"></form>"#;
        assert!(link_attributes(doc).is_empty());
    }

    #[test]
    fn test_unescapes_entities() {
        let doc = r#"<a href="/q?a=1&amp;b=2&#38;c=3">q</a>"#;
        assert_eq!(link_attributes(doc), vec!["/q?a=1&b=2&c=3"]);
    }

    #[test]
    fn test_keeps_empty_values() {
        let doc = r#"<a href="">empty</a><a href>bare</a><img src=" "><a href="/ok">ok</a>"#;
        assert_eq!(link_attributes(doc), vec!["", "", " ", "/ok"]);
    }

    #[test]
    fn test_unclosed_markup_still_scanned() {
        let doc = r#"<div><a href="/one"><span><img src="/two""#;
        let links = link_attributes(doc);
        assert!(links.contains(&"/one".to_string()));
    }

    #[test]
    fn test_unescape_leaves_unknown_references() {
        assert_eq!(unescape("a&b"), "a&b");
        assert_eq!(unescape("a&nbsp;b"), "a&nbsp;b");
        assert_eq!(unescape("&#x41;"), "A");
    }
}
