//! Email parsing into [`RetrievedItem`]s.
//!
//! Messages are parsed with `mail-parser`. A multipart message is flattened
//! into its leaf parts with a bounded work-list: each pass takes the parts
//! of one nesting level, keeps the leaves, and queues the children of the
//! containers. Parts nested deeper than [`MAX_MULTIPART_DEPTH`] levels are
//! dropped.
//!
//! A `message/rfc822` part is a container too: the root of the forwarded
//! message is queued on the next level, so its leaves are classified like
//! any other.
//!
//! Every leaf is decoded here from its transfer-decoded bytes with
//! [`charset::decode`], which falls back to ISO-8859-1.

use std::borrow::Cow;

use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{
    Encoding, HeaderName, Message, MessageParser, MessagePart, MimeHeaders, PartType,
};

use crate::charset;
use crate::content::{Content, EmailHeaders, Origin, RetrievedItem, MULTIPART_EMAIL};

/// Nesting levels examined when flattening a multipart message.
pub const MAX_MULTIPART_DEPTH: usize = 3;

/// Parse a raw RFC 5322 message.
///
/// Never fails: bytes that do not parse as a message are kept as plain
/// text so their links are still scanned.
pub fn parse_email(raw: &[u8], trusted_senders: &[String]) -> RetrievedItem {
    let Some(message) = MessageParser::default().parse(raw) else {
        tracing::debug!(bytes = raw.len(), "unparseable message kept as plain text");
        return RetrievedItem {
            content: Content::SingleEmail(Box::new(Content::PlainText(charset::decode(
                raw, None,
            )))),
            source_url: None,
            content_type: None,
            redirect: None,
            origin: Origin::Email(EmailHeaders::default()),
        };
    };

    let from_address = header_value(&message, HeaderName::From);
    let to_address = header_value(&message, HeaderName::To);
    let trusted_sender = is_trusted(&message, trusted_senders);
    let headers = EmailHeaders {
        from_address,
        to_address,
        trusted_sender,
    };

    let root = message.root_part();
    let (content, content_type) = if is_container(root) {
        (
            Content::MultipartEmail(flatten(&message)),
            MULTIPART_EMAIL.to_string(),
        )
    } else {
        let media_type = media_type(root);
        (
            Content::SingleEmail(Box::new(decode_leaf(&message, root, &media_type))),
            media_type,
        )
    };

    RetrievedItem {
        content,
        source_url: None,
        content_type: Some(content_type),
        redirect: None,
        origin: Origin::Email(headers),
    }
}

fn is_container(part: &MessagePart<'_>) -> bool {
    matches!(part.body, PartType::Multipart(_) | PartType::Message(_))
}

/// Collect leaf parts level by level, up to [`MAX_MULTIPART_DEPTH`] levels.
///
/// Part ids are local to the message that owns them, so the work-list
/// carries the owning message alongside each id.
fn flatten<'m, 'x>(message: &'m Message<'x>) -> Vec<Content> {
    let mut leaves = Vec::new();
    let mut pending: Vec<(&'m Message<'x>, u32)> = vec![(message, 0)];

    for _level in 0..MAX_MULTIPART_DEPTH {
        let mut next_level = Vec::new();
        for (owner, id) in pending {
            let Some(part) = owner.part(id) else {
                continue;
            };
            match &part.body {
                PartType::Multipart(children) => {
                    next_level.extend(children.iter().map(|&child| (owner, child)))
                }
                PartType::Message(nested) => next_level.push((nested, 0)),
                _ => {
                    let media_type = media_type(part);
                    leaves.push(decode_leaf(owner, part, &media_type));
                }
            }
        }
        if next_level.is_empty() {
            break;
        }
        pending = next_level;
    }

    leaves
}

fn decode_leaf(owner: &Message<'_>, part: &MessagePart<'_>, media_type: &str) -> Content {
    let declared = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"));
    let body = charset::decode(&leaf_bytes(owner, part), declared);
    Content::leaf(Some(media_type), body)
}

/// Body bytes of a leaf after transfer decoding, before charset decoding.
///
/// `mail-parser` has already charset-decoded textual parts, lossily, so
/// those are re-read from the raw message.
fn leaf_bytes<'a>(owner: &'a Message<'_>, part: &'a MessagePart<'_>) -> Cow<'a, [u8]> {
    match &part.body {
        PartType::Text(_) | PartType::Html(_) => {
            let raw = owner
                .raw_message
                .get(part.raw_body_offset() as usize..part.raw_end_offset() as usize)
                .unwrap_or_default();
            let decoded = match part.encoding {
                Encoding::Base64 => base64_decode(raw),
                Encoding::QuotedPrintable => quoted_printable_decode(raw),
                Encoding::None => None,
            };
            decoded.map_or(Cow::Borrowed(raw), Cow::Owned)
        }
        _ => Cow::Borrowed(part.contents()),
    }
}

/// `type/subtype` of a part, `text/plain` when undeclared.
fn media_type(part: &MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}

fn header_value<'x>(message: &Message<'x>, name: HeaderName<'x>) -> Option<String> {
    message
        .header_raw(name)
        .map(|raw| raw.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|value| !value.is_empty())
}

fn is_trusted(message: &Message<'_>, trusted_senders: &[String]) -> bool {
    if trusted_senders.is_empty() {
        return false;
    }
    let Some(sender) = message
        .from()
        .and_then(|from| from.first())
        .and_then(|addr| addr.address())
    else {
        return false;
    };
    trusted_senders
        .iter()
        .any(|trusted| trusted.trim().eq_ignore_ascii_case(sender))
}
