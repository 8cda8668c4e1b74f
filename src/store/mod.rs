//! Storage abstraction for the provenance graph.
//!
//! The [`ProvenanceStore`] trait is everything the ingestion and crawl
//! pipeline needs from persistence: insert-if-absent writes for domains,
//! URLs, content and edges, the explored marker, and the frontier query.
//! Backends: [`memory::InMemoryStore`] for tests and store-less commands,
//! [`SqliteStore`](crate::sqlite_store::SqliteStore) for the CLI.
//!
//! Every insert is idempotent: a second call with the same logical key
//! returns the existing id with `is_new == false`. Backends must keep that
//! atomic per key when called from concurrent tasks.
//!
//! # Operations
//!
//! | Method | Key |
//! |--------|-----|
//! | [`insert_domain_if_absent`](ProvenanceStore::insert_domain_if_absent) | domain value |
//! | [`insert_url_if_absent`](ProvenanceStore::insert_url_if_absent) | exact URL string |
//! | [`insert_content_if_absent`](ProvenanceStore::insert_content_if_absent) | dedup hash |
//! | [`insert_edge_if_absent`](ProvenanceStore::insert_edge_if_absent) | (source, target, identity) |
//! | [`mark_explored`](ProvenanceStore::mark_explored) | exact URL string |
//! | [`unexplored_urls`](ProvenanceStore::unexplored_urls) | n/a |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Domain, Edge, Inserted, NewContent, RecordId, StoreSummary, UrlRecord};

#[async_trait]
pub trait ProvenanceStore: Send + Sync {
    async fn insert_domain_if_absent(&self, domain: &Domain) -> Result<Inserted>;

    /// New URLs start unexplored.
    async fn insert_url_if_absent(&self, value: &str, domain_id: RecordId) -> Result<Inserted>;

    async fn find_url(&self, value: &str) -> Result<Option<UrlRecord>>;

    /// Web content and emails are keyed separately; the returned id belongs
    /// to the matching table.
    async fn insert_content_if_absent(&self, content: &NewContent) -> Result<Inserted>;

    /// Returns `true` when the edge was not present before.
    async fn insert_edge_if_absent(&self, edge: &Edge) -> Result<bool>;

    /// Set the explored flag. Unknown URLs are ignored; the flag never reverts.
    async fn mark_explored(&self, value: &str) -> Result<()>;

    /// Unexplored URL strings in insertion order.
    async fn unexplored_urls(&self) -> Result<Vec<String>>;

    async fn summary(&self) -> Result<StoreSummary>;
}
