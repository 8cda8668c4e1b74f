//! Record types persisted by a [`ProvenanceStore`](crate::store::ProvenanceStore).
//!
//! These are the rows of the provenance graph: domains, URLs, retrieved
//! content, emails, and the identity-tagged edges linking them.

use serde::Serialize;

use crate::content::ContentKind;

/// Database key of any stored record.
pub type RecordId = i64;

/// Identity tag used on edges from an email to the URLs it contains.
pub const FROM_EMAIL: &str = "from-email";

/// Scheme and authority of a URL, e.g. `http://example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Domain(pub String);

impl Domain {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A URL as observed, tracked by its exact string value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRecord {
    pub id: RecordId,
    pub value: String,
    pub domain_id: RecordId,
    pub processed: bool,
}

/// Result of an insert-if-absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    pub id: RecordId,
    pub is_new: bool,
}

impl Inserted {
    pub fn new(id: RecordId) -> Self {
        Self { id, is_new: true }
    }

    pub fn existing(id: RecordId) -> Self {
        Self { id, is_new: false }
    }
}

/// Content ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewContent {
    Web {
        kind: ContentKind,
        content_type: Option<String>,
        source_url: Option<String>,
        redirect: Option<String>,
        body: String,
        dedup_hash: String,
    },
    Email {
        from_address: Option<String>,
        to_address: Option<String>,
        trusted_sender: bool,
        body: String,
        dedup_hash: String,
    },
}

impl NewContent {
    pub fn dedup_hash(&self) -> &str {
        match self {
            NewContent::Web { dedup_hash, .. } | NewContent::Email { dedup_hash, .. } => {
                dedup_hash
            }
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, NewContent::Email { .. })
    }
}

/// Origin of a provenance edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeSource {
    /// Fetched content, pointing at the URL it was retrieved from.
    Content(RecordId),
    /// A URL whose content linked to the target.
    Url(RecordId),
    /// An email containing the target.
    Email(RecordId),
}

impl EdgeSource {
    pub fn kind(&self) -> &'static str {
        match self {
            EdgeSource::Content(_) => "content",
            EdgeSource::Url(_) => "url",
            EdgeSource::Email(_) => "email",
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            EdgeSource::Content(id) | EdgeSource::Url(id) | EdgeSource::Email(id) => *id,
        }
    }
}

/// One identity's observation that `source` leads to `target_url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: EdgeSource,
    pub target_url: RecordId,
    pub identity: String,
}

/// Row counts across the provenance graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub domains: i64,
    pub urls_explored: i64,
    pub urls_unexplored: i64,
    pub html_contents: i64,
    pub script_contents: i64,
    pub plain_contents: i64,
    pub emails: i64,
    pub edges: i64,
}
