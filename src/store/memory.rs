//! In-memory [`ProvenanceStore`] for tests and store-less commands.
//!
//! All tables live behind one `RwLock`, so every insert-if-absent is a
//! single critical section.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::content::ContentKind;
use crate::models::{Domain, Edge, Inserted, NewContent, RecordId, StoreSummary, UrlRecord};

use super::ProvenanceStore;

#[derive(Default)]
struct Tables {
    domains: HashMap<String, RecordId>,
    urls: Vec<UrlRecord>,
    url_ids: HashMap<String, RecordId>,
    contents: Vec<NewContent>,
    content_ids: HashMap<String, RecordId>,
    emails: Vec<NewContent>,
    email_ids: HashMap<String, RecordId>,
    edges: Vec<Edge>,
    edge_keys: HashSet<Edge>,
}

/// Store backed by process memory. Ids are 1-based per table.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every edge in insertion order.
    pub fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self.read()?.edges.clone())
    }

    /// Stored web content and emails, in insertion order.
    pub fn contents(&self) -> Result<(Vec<NewContent>, Vec<NewContent>)> {
        let tables = self.read()?;
        Ok((tables.contents.clone(), tables.emails.clone()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn next_id(len: usize) -> RecordId {
    len as RecordId + 1
}

#[async_trait]
impl ProvenanceStore for InMemoryStore {
    async fn insert_domain_if_absent(&self, domain: &Domain) -> Result<Inserted> {
        let mut tables = self.write()?;
        if let Some(&id) = tables.domains.get(domain.as_str()) {
            return Ok(Inserted::existing(id));
        }
        let id = next_id(tables.domains.len());
        tables.domains.insert(domain.as_str().to_string(), id);
        Ok(Inserted::new(id))
    }

    async fn insert_url_if_absent(&self, value: &str, domain_id: RecordId) -> Result<Inserted> {
        let mut tables = self.write()?;
        if let Some(&id) = tables.url_ids.get(value) {
            return Ok(Inserted::existing(id));
        }
        let id = next_id(tables.urls.len());
        tables.urls.push(UrlRecord {
            id,
            value: value.to_string(),
            domain_id,
            processed: false,
        });
        tables.url_ids.insert(value.to_string(), id);
        Ok(Inserted::new(id))
    }

    async fn find_url(&self, value: &str) -> Result<Option<UrlRecord>> {
        let tables = self.read()?;
        Ok(tables
            .url_ids
            .get(value)
            .and_then(|&id| tables.urls.get(id as usize - 1))
            .cloned())
    }

    async fn insert_content_if_absent(&self, content: &NewContent) -> Result<Inserted> {
        let mut guard = self.write()?;
        let tables = &mut *guard;
        let (rows, ids) = if content.is_email() {
            (&mut tables.emails, &mut tables.email_ids)
        } else {
            (&mut tables.contents, &mut tables.content_ids)
        };
        if let Some(&id) = ids.get(content.dedup_hash()) {
            return Ok(Inserted::existing(id));
        }
        let id = next_id(rows.len());
        rows.push(content.clone());
        ids.insert(content.dedup_hash().to_string(), id);
        Ok(Inserted::new(id))
    }

    async fn insert_edge_if_absent(&self, edge: &Edge) -> Result<bool> {
        let mut tables = self.write()?;
        if !tables.edge_keys.insert(edge.clone()) {
            return Ok(false);
        }
        tables.edges.push(edge.clone());
        Ok(true)
    }

    async fn mark_explored(&self, value: &str) -> Result<()> {
        let mut guard = self.write()?;
        let tables = &mut *guard;
        if let Some(&id) = tables.url_ids.get(value) {
            if let Some(record) = tables.urls.get_mut(id as usize - 1) {
                record.processed = true;
            }
        }
        Ok(())
    }

    async fn unexplored_urls(&self) -> Result<Vec<String>> {
        let tables = self.read()?;
        Ok(tables
            .urls
            .iter()
            .filter(|record| !record.processed)
            .map(|record| record.value.clone())
            .collect())
    }

    async fn summary(&self) -> Result<StoreSummary> {
        let tables = self.read()?;
        let count_kind = |kind: ContentKind| {
            tables
                .contents
                .iter()
                .filter(|c| matches!(c, NewContent::Web { kind: k, .. } if *k == kind))
                .count() as i64
        };
        let explored = tables.urls.iter().filter(|u| u.processed).count() as i64;
        Ok(StoreSummary {
            domains: tables.domains.len() as i64,
            urls_explored: explored,
            urls_unexplored: tables.urls.len() as i64 - explored,
            html_contents: count_kind(ContentKind::Html),
            script_contents: count_kind(ContentKind::Script),
            plain_contents: count_kind(ContentKind::PlainText),
            emails: tables.emails.len() as i64,
            edges: tables.edges.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EdgeSource;

    fn web(body: &str, hash: &str) -> NewContent {
        NewContent::Web {
            kind: ContentKind::Html,
            content_type: Some("text/html".to_string()),
            source_url: Some("http://a.test/".to_string()),
            redirect: None,
            body: body.to_string(),
            dedup_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn test_url_insert_is_idempotent() {
        let store = InMemoryStore::new();
        let domain = store
            .insert_domain_if_absent(&Domain("http://a.test".to_string()))
            .await
            .unwrap();
        assert!(domain.is_new);

        let first = store.insert_url_if_absent("http://a.test/x", domain.id).await.unwrap();
        let second = store.insert_url_if_absent("http://a.test/x", domain.id).await.unwrap();
        assert!(first.is_new);
        assert_eq!(second, Inserted::existing(first.id));

        // exact-string identity: trailing slash is a different URL
        let other = store.insert_url_if_absent("http://a.test/x/", domain.id).await.unwrap();
        assert!(other.is_new);
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_explored_flag_is_monotone() {
        let store = InMemoryStore::new();
        store.insert_url_if_absent("http://a.test/1", 1).await.unwrap();
        store.insert_url_if_absent("http://a.test/2", 1).await.unwrap();
        store.insert_url_if_absent("http://a.test/3", 1).await.unwrap();

        store.mark_explored("http://a.test/2").await.unwrap();
        store.mark_explored("http://unknown.test/").await.unwrap();
        assert_eq!(
            store.unexplored_urls().await.unwrap(),
            vec!["http://a.test/1", "http://a.test/3"]
        );

        // re-inserting an explored URL does not reset it
        store.insert_url_if_absent("http://a.test/2", 1).await.unwrap();
        assert!(store.find_url("http://a.test/2").await.unwrap().unwrap().processed);
    }

    #[tokio::test]
    async fn test_content_dedup_by_hash() {
        let store = InMemoryStore::new();
        let a = store.insert_content_if_absent(&web("one", "h1")).await.unwrap();
        let b = store.insert_content_if_absent(&web("one", "h1")).await.unwrap();
        let c = store.insert_content_if_absent(&web("two", "h2")).await.unwrap();
        assert!(a.is_new);
        assert!(!b.is_new);
        assert_eq!(a.id, b.id);
        assert!(c.is_new);

        let email = NewContent::Email {
            from_address: None,
            to_address: None,
            trusted_sender: false,
            body: "one".to_string(),
            dedup_hash: "h1".to_string(),
        };
        let e = store.insert_content_if_absent(&email).await.unwrap();
        assert!(e.is_new);

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.html_contents, 2);
        assert_eq!(summary.emails, 1);
    }

    #[tokio::test]
    async fn test_edge_insert_is_idempotent() {
        let store = InMemoryStore::new();
        let edge = Edge {
            source: EdgeSource::Url(1),
            target_url: 2,
            identity: "agent-a".to_string(),
        };
        assert!(store.insert_edge_if_absent(&edge).await.unwrap());
        assert!(!store.insert_edge_if_absent(&edge).await.unwrap());

        let other_identity = Edge {
            identity: "agent-b".to_string(),
            ..edge.clone()
        };
        assert!(store.insert_edge_if_absent(&other_identity).await.unwrap());

        let other_source_kind = Edge {
            source: EdgeSource::Content(1),
            ..edge
        };
        assert!(store.insert_edge_if_absent(&other_source_kind).await.unwrap());
        assert_eq!(store.summary().await.unwrap().edges, 3);
    }
}
