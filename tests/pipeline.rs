//! End-to-end runs through the library API: mailbox to store to crawl,
//! with an in-memory store and a transport that serves canned pages.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use malmail::content::{Content, ContentKind};
use malmail::crawl::CrawlScheduler;
use malmail::email::parse_email;
use malmail::fetcher::MultiAgentFetcher;
use malmail::ingest::ingest_messages;
use malmail::mailbox::RawMessage;
use malmail::models::{EdgeSource, NewContent, FROM_EMAIL};
use malmail::store::memory::InMemoryStore;
use malmail::store::ProvenanceStore;
use malmail::transport::{FetchError, FetchedResponse, Transport};

/// Canned HTML per URL; records every (url, identity) request.
#[derive(Default)]
struct CannedSite {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<(String, String)>>,
}

impl CannedSite {
    fn with(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(u, b)| (u.to_string(), b.to_string()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requested_urls(&self) -> HashSet<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(u, _)| u.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for CannedSite {
    async fn fetch(
        &self,
        url: &str,
        identity: &str,
        _timeout: Duration,
    ) -> Result<FetchedResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), identity.to_string()));
        match self.pages.get(url) {
            Some(body) => Ok(FetchedResponse::new(
                body.clone().into_bytes(),
                vec![("content-type".to_string(), "text/html".to_string())],
            )),
            None => Err(FetchError::HttpStatus {
                code: 404,
                reason: "Not Found".to_string(),
            }),
        }
    }
}

fn roster() -> Vec<String> {
    vec!["agent-a".to_string(), "agent-b".to_string()]
}

fn message(id: &str, body: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        bytes: format!("From: a@x.example\r\nTo: b@y.example\r\nContent-Type: text/plain\r\n\r\n{body}\r\n")
            .into_bytes(),
    }
}

#[tokio::test]
async fn test_plain_text_email_seeds_urls_with_from_email_edges() {
    let store = InMemoryStore::new();
    let messages = vec![message(
        "1.eml",
        "visit http://example.com/a and http://example.com/b",
    )];

    let item = parse_email(&messages[0].bytes, &[]);
    let links: HashSet<String> = item.extract_links().into_iter().collect();
    let expected: HashSet<String> = ["http://example.com/a", "http://example.com/b"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(links, expected);

    let report = ingest_messages(&store, &messages, &[]).await.unwrap();
    assert_eq!(report.new_urls, 2);

    let a = store.find_url("http://example.com/a").await.unwrap().unwrap();
    let b = store.find_url("http://example.com/b").await.unwrap().unwrap();
    assert_eq!(a.domain_id, b.domain_id);
    assert!(!a.processed);
    assert_eq!(store.summary().await.unwrap().domains, 1);

    let (web, emails) = store.contents().unwrap();
    assert!(web.is_empty());
    match emails.as_slice() {
        [NewContent::Email {
            from_address, body, ..
        }] => {
            assert_eq!(from_address.as_deref(), Some("a@x.example"));
            assert!(body.contains("http://example.com/b"));
        }
        other => panic!("expected one stored email, got {other:?}"),
    }

    let edges = store.edges().unwrap();
    assert_eq!(edges.len(), 2);
    for (edge, url) in edges.iter().zip([a.id, b.id]) {
        assert!(matches!(edge.source, EdgeSource::Email(_)));
        assert_eq!(edge.target_url, url);
        assert_eq!(edge.identity, FROM_EMAIL);
    }
}

#[tokio::test]
async fn test_two_identities_identical_html_form_one_group() {
    let site = CannedSite::with(&[("http://example.com/x", r#"<a href="/y">y</a>"#)]);
    let fetcher = MultiAgentFetcher::new(site, roster(), Duration::from_secs(2));

    let outcome = fetcher.fetch("http://example.com/x").await;
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].identities, roster());
    assert_eq!(outcome.groups[0].item.content.kind(), ContentKind::Html);
    assert_eq!(
        outcome.groups[0].item.extract_links(),
        vec!["http://example.com/y"]
    );
}

#[tokio::test]
async fn test_malformed_url_never_reaches_transport() {
    let site = CannedSite::with(&[]);
    let fetcher = MultiAgentFetcher::new(site.clone(), roster(), Duration::from_secs(2));

    let outcome = fetcher.fetch("not a url").await;
    assert!(outcome.groups.is_empty());
    assert!(site.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_email_to_crawl_round_cap() {
    let site = CannedSite::with(&[
        ("http://start.test/", r#"<a href="/one">1</a><a href="http://side.test/">s</a>"#),
        ("http://start.test/one", r#"<a href="/two">2</a>"#),
        ("http://side.test/", "<p>dead end</p>"),
        ("http://start.test/two", r#"<a href="/three">3</a>"#),
    ]);
    let store = InMemoryStore::new();
    ingest_messages(&store, &[message("1.eml", "go http://start.test/ now")], &[])
        .await
        .unwrap();

    let fetcher = MultiAgentFetcher::new(site.clone(), roster(), Duration::from_secs(2));
    let scheduler = CrawlScheduler::new(fetcher, 2).with_url_concurrency(4);
    let report = scheduler.run(&store).await.unwrap();

    let fetched = site.requested_urls();
    let expected: HashSet<String> = ["http://start.test/", "http://start.test/one", "http://side.test/"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(fetched, expected);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.unfetched, 1);

    // discovered in the last round: explored but never fetched
    let two = store.find_url("http://start.test/two").await.unwrap().unwrap();
    assert!(two.processed);
    assert!(store.find_url("http://start.test/three").await.unwrap().is_none());
    assert!(store.unexplored_urls().await.unwrap().is_empty());

    let (web, emails) = store.contents().unwrap();
    assert_eq!(emails.len(), 1);
    let sources: HashSet<String> = web
        .iter()
        .filter_map(|row| match row {
            NewContent::Web { source_url, .. } => source_url.clone(),
            NewContent::Email { .. } => None,
        })
        .collect();
    assert_eq!(web.len(), 3);
    assert_eq!(sources, expected);

    // second crawl has nothing left to do
    let again = scheduler.run(&store).await.unwrap();
    assert_eq!(again.urls_fetched, 0);
}

#[tokio::test]
async fn test_multipart_flattening_matches_leaf_links() {
    let raw = "From: a@x.example\r\n\
Content-Type: multipart/mixed; boundary=OUT\r\n\
\r\n\
--OUT\r\n\
Content-Type: multipart/alternative; boundary=IN\r\n\
\r\n\
--IN\r\n\
Content-Type: text/plain\r\n\
\r\n\
read http://plain.test/p\r\n\
--IN\r\n\
Content-Type: text/html\r\n\
\r\n\
<img SRC=\"http://html.test/i.png\">\r\n\
--IN--\r\n\
--OUT\r\n\
Content-Type: application/javascript\r\n\
\r\n\
fetch('http://script.test/s')\r\n\
--OUT--\r\n";

    let item = parse_email(raw.as_bytes(), &[]);
    let parts = match &item.content {
        Content::MultipartEmail(parts) => parts.clone(),
        other => panic!("expected multipart, got {other:?}"),
    };
    let from_leaves: HashSet<String> = parts.iter().flat_map(|p| p.extract_links()).collect();
    let from_item: HashSet<String> = item.extract_links().into_iter().collect();
    assert_eq!(from_item, from_leaves);
    assert!(from_item.contains("http://plain.test/p"));
    assert!(from_item.contains("http://html.test/i.png"));
    assert!(!from_item.contains("http://script.test/s"));
}
