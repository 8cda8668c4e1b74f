//! Typed representation of retrieved bytes.
//!
//! A [`Content`] is one of a closed set of variants selected from a media
//! type by [`ContentKind::for_media_type`]. Every variant answers the same
//! two questions: which links does it contain ([`Content::extract_links`])
//! and what is its body text ([`Content::body_text`]).
//!
//! [`RetrievedItem`] wraps a `Content` with where it came from: the source
//! URL, declared content type, and `Refresh` redirect for web responses, or
//! the sender/recipient headers for email. Relative links are resolved
//! against the source URL when one is known.
//!
//! # Dispatch table
//!
//! | Media type | Variant |
//! |------------|---------|
//! | `text/html` | [`Content::Html`] |
//! | `text/plain` | [`Content::PlainText`] |
//! | `application/javascript` | [`Content::Script`] |
//! | `multipart-email` | [`Content::MultipartEmail`] |
//! | anything else, or none | [`Content::PlainText`] |

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::charset;
use crate::html;
use crate::models::NewContent;
use crate::transport::FetchedResponse;

/// Synthetic media type tag for a flattened multipart message.
pub const MULTIPART_EMAIL: &str = "multipart-email";

const LINK_PREFIXES: [&str; 2] = ["http://", "https://"];

/// Variant tag of a [`Content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PlainText,
    Html,
    Script,
    MultipartEmail,
    SingleEmail,
}

impl ContentKind {
    /// Select the variant for a media type. Unknown or missing types read
    /// as plain text so their raw link tokens are still scanned.
    pub fn for_media_type(media_type: Option<&str>) -> ContentKind {
        let normalized = media_type.map(|m| m.trim().to_ascii_lowercase());
        match normalized.as_deref() {
            Some("text/html") => ContentKind::Html,
            Some("text/plain") => ContentKind::PlainText,
            Some("application/javascript") => ContentKind::Script,
            Some(MULTIPART_EMAIL) => ContentKind::MultipartEmail,
            _ => ContentKind::PlainText,
        }
    }

    /// Storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::PlainText => "plain",
            ContentKind::Html => "html",
            ContentKind::Script => "script",
            ContentKind::MultipartEmail => "multipart",
            ContentKind::SingleEmail => "email",
        }
    }
}

/// Retrieved content, one variant per media type family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Content {
    PlainText(String),
    Html(String),
    /// Script bodies are kept but not scanned for links.
    Script(String),
    /// Leaves of a multipart message, in flattening order.
    MultipartEmail(Vec<Content>),
    /// Payload of a non-multipart message.
    SingleEmail(Box<Content>),
}

impl Content {
    /// Build a leaf variant for decoded text of the given media type.
    ///
    /// The multipart tag has no text form; such input is treated as plain text.
    pub fn leaf(media_type: Option<&str>, body: String) -> Content {
        match ContentKind::for_media_type(media_type) {
            ContentKind::Html => Content::Html(body),
            ContentKind::Script => Content::Script(body),
            _ => Content::PlainText(body),
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Content::PlainText(_) => ContentKind::PlainText,
            Content::Html(_) => ContentKind::Html,
            Content::Script(_) => ContentKind::Script,
            Content::MultipartEmail(_) => ContentKind::MultipartEmail,
            Content::SingleEmail(_) => ContentKind::SingleEmail,
        }
    }

    /// Links contained in the body, unresolved, in document order.
    pub fn extract_links(&self) -> Vec<String> {
        match self {
            Content::PlainText(body) => plain_text_links(body),
            Content::Html(body) => html::link_attributes(body),
            // No link extraction for scripts yet.
            Content::Script(_) => Vec::new(),
            Content::MultipartEmail(parts) => {
                parts.iter().flat_map(|part| part.extract_links()).collect()
            }
            Content::SingleEmail(inner) => inner.extract_links(),
        }
    }

    pub fn body_text(&self) -> String {
        match self {
            Content::PlainText(body) | Content::Html(body) | Content::Script(body) => {
                body.clone()
            }
            Content::MultipartEmail(parts) => parts
                .iter()
                .map(|part| part.body_text())
                .collect::<Vec<_>>()
                .join("\n"),
            Content::SingleEmail(inner) => inner.body_text(),
        }
    }
}

/// Whitespace-delimited tokens starting with `http://` or `https://`.
///
/// Line breaks are removed first so links wrapped across display lines
/// are rejoined. A link glued to preceding text (`see:http://x`) is not
/// found.
pub fn plain_text_links(body: &str) -> Vec<String> {
    let joined: String = body.chars().filter(|&c| c != '\n' && c != '\r').collect();
    joined
        .split_whitespace()
        .filter(|token| LINK_PREFIXES.iter().any(|prefix| token.starts_with(prefix)))
        .map(str::to_string)
        .collect()
}

/// Header metadata carried by email items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailHeaders {
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub trusted_sender: bool,
}

/// Where a [`RetrievedItem`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Web,
    Email(EmailHeaders),
}

/// A [`Content`] plus retrieval metadata.
///
/// Equality and hashing cover the tuple (source URL, content, redirect,
/// content type): two fetches that produced the same bytes under the same
/// headers compare equal regardless of which identity made them.
#[derive(Debug, Clone)]
pub struct RetrievedItem {
    pub content: Content,
    pub source_url: Option<String>,
    pub content_type: Option<String>,
    pub redirect: Option<String>,
    pub origin: Origin,
}

impl RetrievedItem {
    /// Classify a web response fetched from `url`.
    pub fn from_response(url: &str, response: &FetchedResponse) -> RetrievedItem {
        let header = response.header("content-type");
        let media_type = header
            .map(|h| h.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|m| !m.is_empty());
        let declared = header.and_then(charset::charset_param);
        let body = charset::decode(&response.body, declared);

        RetrievedItem {
            content: Content::leaf(media_type.as_deref(), body),
            source_url: Some(url.to_string()),
            content_type: media_type,
            redirect: response.header("refresh").and_then(refresh_target),
            origin: Origin::Web,
        }
    }

    pub fn email_headers(&self) -> Option<&EmailHeaders> {
        match &self.origin {
            Origin::Email(headers) => Some(headers),
            Origin::Web => None,
        }
    }

    pub fn body_text(&self) -> String {
        self.content.body_text()
    }

    /// Contained links, resolved against the source URL and de-duplicated
    /// keeping first occurrence.
    pub fn extract_links(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.content
            .extract_links()
            .into_iter()
            .map(|link| match &self.source_url {
                Some(base) => absolutize(base, &link),
                None => link,
            })
            .filter(|link| seen.insert(link.clone()))
            .collect()
    }

    /// SHA-256 over the equality tuple, used as the storage dedup key.
    pub fn dedup_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, Some(self.content.kind().as_str()));
        hash_field(&mut hasher, self.source_url.as_deref());
        hash_field(&mut hasher, self.content_type.as_deref());
        hash_field(&mut hasher, self.redirect.as_deref());
        if let Origin::Email(headers) = &self.origin {
            hash_field(&mut hasher, headers.from_address.as_deref());
            hash_field(&mut hasher, headers.to_address.as_deref());
            hash_field(&mut hasher, Some(if headers.trusted_sender { "1" } else { "0" }));
        }
        hash_field(&mut hasher, Some(&self.body_text()));
        format!("{:x}", hasher.finalize())
    }

    /// Store-ready form of this item.
    pub fn to_new_content(&self) -> NewContent {
        match &self.origin {
            Origin::Web => NewContent::Web {
                kind: self.content.kind(),
                content_type: self.content_type.clone(),
                source_url: self.source_url.clone(),
                redirect: self.redirect.clone(),
                body: self.body_text(),
                dedup_hash: self.dedup_hash(),
            },
            Origin::Email(headers) => NewContent::Email {
                from_address: headers.from_address.clone(),
                to_address: headers.to_address.clone(),
                trusted_sender: headers.trusted_sender,
                body: self.body_text(),
                dedup_hash: self.dedup_hash(),
            },
        }
    }

    fn equality_key(&self) -> (&Option<String>, &Content, &Option<String>, &Option<String>) {
        (
            &self.source_url,
            &self.content,
            &self.redirect,
            &self.content_type,
        )
    }
}

impl PartialEq for RetrievedItem {
    fn eq(&self, other: &Self) -> bool {
        self.equality_key() == other.equality_key()
    }
}

impl Eq for RetrievedItem {}

impl Hash for RetrievedItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.equality_key().hash(state);
    }
}

fn hash_field(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update((v.len() as u64).to_le_bytes());
            hasher.update(v.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

/// Resolve `link` against `base`. Absolute links are returned verbatim and
/// unresolvable ones are returned unchanged.
pub fn absolutize(base: &str, link: &str) -> String {
    if url::Url::parse(link).is_ok() {
        return link.to_string();
    }
    url::Url::parse(base)
        .and_then(|base| base.join(link))
        .map(|joined| joined.to_string())
        .unwrap_or_else(|_| link.to_string())
}

/// Target of a `Refresh` header such as `5; url=https://next.test/`.
fn refresh_target(header: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();
    let start = lower.find("url=")? + "url=".len();
    let target = header[start..].trim().trim_matches(|c| c == '"' || c == '\'');
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}
