//! Declared-charset decoding with a terminal 8-bit fallback.
//!
//! Bytes are decoded strictly under the declared label. An unknown label,
//! a missing label, or a malformed byte sequence falls back to ISO-8859-1,
//! which maps every byte to a code point and therefore cannot fail.

use encoding_rs::Encoding;

/// Name of the fallback charset.
pub const FALLBACK_CHARSET: &str = "ISO-8859-1";

/// Decode `bytes` using `declared`, falling back to ISO-8859-1.
pub fn decode(bytes: &[u8], declared: Option<&str>) -> String {
    let label = declared
        .map(|l| l.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|l| !l.is_empty());

    if let Some(label) = label {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes)
                {
                    return text.into_owned();
                }
                tracing::debug!(
                    charset = label,
                    fallback = FALLBACK_CHARSET,
                    "malformed bytes for declared charset"
                );
            }
            None => {
                tracing::debug!(charset = label, fallback = FALLBACK_CHARSET, "unknown charset label");
            }
        }
    }

    decode_latin1(bytes)
}

/// ISO-8859-1: each byte is the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Pull the `charset=` parameter out of a `Content-Type` header value.
pub fn charset_param(content_type: &str) -> Option<&str> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("charset=")? + "charset=".len();
    let rest = &content_type[start..];
    let end = rest.find(';').unwrap_or(rest.len());
    let value = rest[..end].trim().trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
