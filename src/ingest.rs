//! Email ingestion.
//!
//! One pass over a mailbox with no network access: each message is parsed,
//! stored as an email record, and its links are recorded as unexplored URLs
//! with `from-email` edges. Those URLs form the first crawl frontier.

use anyhow::Result;
use serde::Serialize;

use crate::email::parse_email;
use crate::mailbox::{Mailbox, RawMessage};
use crate::provenance::{record_links, Referrer};
use crate::store::ProvenanceStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub messages: usize,
    pub new_emails: usize,
    pub links: usize,
    pub new_urls: usize,
    pub new_edges: usize,
}

impl IngestReport {
    pub fn print(&self) {
        println!("ingest");
        println!("  messages: {}", self.messages);
        println!("  new emails: {}", self.new_emails);
        println!("  links found: {}", self.links);
        println!("  new urls: {}", self.new_urls);
        println!("  new edges: {}", self.new_edges);
        println!("ok");
    }
}

/// Read every message from `mailbox` and ingest it.
pub async fn ingest_mailbox<S, M>(
    store: &S,
    mailbox: &M,
    trusted_senders: &[String],
) -> Result<IngestReport>
where
    S: ProvenanceStore + ?Sized,
    M: Mailbox + ?Sized,
{
    let messages = mailbox.messages()?;
    ingest_messages(store, &messages, trusted_senders).await
}

pub async fn ingest_messages<S: ProvenanceStore + ?Sized>(
    store: &S,
    messages: &[RawMessage],
    trusted_senders: &[String],
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for message in messages {
        let item = parse_email(&message.bytes, trusted_senders);
        let email = store.insert_content_if_absent(&item.to_new_content()).await?;
        let links = item.extract_links();
        tracing::debug!(message = message.id.as_str(), links = links.len(), "message parsed");

        let tally = record_links(store, &links, &Referrer::Email(email.id)).await?;

        report.messages += 1;
        if email.is_new {
            report.new_emails += 1;
        }
        report.links += links.len();
        report.new_urls += tally.new_urls;
        report.new_edges += tally.new_edges;
    }

    tracing::info!(
        messages = report.messages,
        new_urls = report.new_urls,
        "mailbox ingested"
    );
    Ok(report)
}
