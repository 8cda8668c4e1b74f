//! Insertion contracts between the pipeline and a [`ProvenanceStore`].
//!
//! Recording a URL always records its domain first. Recording links
//! attaches an edge from whatever referred them: an email, or a source URL
//! once per observing identity. Recorded content gets one edge per identity
//! back to the URL it was fetched from.

use anyhow::Result;

use crate::content::RetrievedItem;
use crate::models::{Domain, Edge, EdgeSource, Inserted, RecordId, FROM_EMAIL};
use crate::store::ProvenanceStore;

/// Scheme and authority of `url`, with path, query and fragment stripped.
///
/// Purely textual: `http://Example.com:80/a` yields `http://Example.com:80`.
/// Values without `//` keep only the scheme (`mailto:`), and values
/// without a scheme yield an empty domain.
pub fn domain_of(url: &str) -> Domain {
    let Some(colon) = url.find(':') else {
        return Domain(String::new());
    };
    let scheme = &url[..colon];
    if scheme.is_empty() || scheme.contains(['/', '?', '#']) {
        return Domain(String::new());
    }

    let rest = &url[colon + 1..];
    match rest.strip_prefix("//") {
        Some(after) => {
            let end = after.find(['/', '?', '#']).unwrap_or(after.len());
            Domain(format!("{}//{}", &url[..=colon], &after[..end]))
        }
        None => Domain(url[..=colon].to_string()),
    }
}

/// Who referred a batch of links.
#[derive(Debug, Clone)]
pub enum Referrer<'a> {
    Email(RecordId),
    /// A fetched URL, with the identities that saw the links.
    Url {
        source: &'a str,
        identities: &'a [String],
    },
}

/// Totals from one [`record_links`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkTally {
    pub new_urls: usize,
    pub new_edges: usize,
}

/// Record `url` and its domain.
pub async fn record_url<S: ProvenanceStore + ?Sized>(store: &S, url: &str) -> Result<Inserted> {
    let domain = store.insert_domain_if_absent(&domain_of(url)).await?;
    store.insert_url_if_absent(url, domain.id).await
}

/// Record each link and an edge from the referrer to it.
pub async fn record_links<S: ProvenanceStore + ?Sized>(
    store: &S,
    links: &[String],
    referrer: &Referrer<'_>,
) -> Result<LinkTally> {
    let mut tally = LinkTally::default();

    let (source, identities): (EdgeSource, Vec<&str>) = match referrer {
        Referrer::Email(id) => (EdgeSource::Email(*id), vec![FROM_EMAIL]),
        Referrer::Url { source, identities } => match store.find_url(source).await? {
            Some(record) => (
                EdgeSource::Url(record.id),
                identities.iter().map(String::as_str).collect(),
            ),
            None => {
                tracing::warn!(url = *source, "referring url not in store, links recorded without edges");
                for link in links {
                    if record_url(store, link).await?.is_new {
                        tally.new_urls += 1;
                    }
                }
                return Ok(tally);
            }
        },
    };

    for link in links {
        let target = record_url(store, link).await?;
        if target.is_new {
            tally.new_urls += 1;
        }
        for identity in &identities {
            let edge = Edge {
                source,
                target_url: target.id,
                identity: identity.to_string(),
            };
            if store.insert_edge_if_absent(&edge).await? {
                tally.new_edges += 1;
            }
        }
    }

    Ok(tally)
}

/// Record fetched content and link it to `source_url` for each identity.
///
/// Returns the content insert result; when the source URL is unknown the
/// content is still stored, without edges.
pub async fn record_content<S: ProvenanceStore + ?Sized>(
    store: &S,
    item: &RetrievedItem,
    source_url: &str,
    identities: &[String],
) -> Result<Inserted> {
    let content = store.insert_content_if_absent(&item.to_new_content()).await?;

    let Some(url) = store.find_url(source_url).await? else {
        tracing::warn!(url = source_url, "source url not in store, content recorded without edges");
        return Ok(content);
    };

    for identity in identities {
        store
            .insert_edge_if_absent(&Edge {
                source: EdgeSource::Content(content.id),
                target_url: url.id,
                identity: identity.clone(),
            })
            .await?;
    }
    Ok(content)
}
