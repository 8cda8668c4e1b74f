//! Round-based crawl over the store's unexplored URLs.
//!
//! Each round fetches every frontier URL with the full identity roster,
//! records content and links, then marks the whole frontier explored.
//! Links found in a round form the next frontier. After `depth` rounds the
//! remaining frontier is marked explored without being fetched, which caps
//! network cost at `depth` rounds whatever the branching factor.
//!
//! URLs inside a round are fetched concurrently (`url_concurrency`), but
//! their results are written to the store in frontier order, and the
//! explored marking only happens once the whole round has completed.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::CrawlConfig;
use crate::fetcher::{FetchOutcome, MultiAgentFetcher};
use crate::provenance::{record_content, record_links, record_url, Referrer};
use crate::store::ProvenanceStore;
use crate::transport::Transport;

/// A URL whose identities were served different responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloakedUrl {
    pub url: String,
    /// Identity lists, one per distinct response.
    pub groups: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub rounds: usize,
    /// URLs that reached the transport with at least one identity.
    pub urls_fetched: usize,
    /// URLs that did not parse and were never requested.
    pub malformed: usize,
    pub groups: usize,
    pub new_contents: usize,
    pub new_urls: usize,
    pub failures: usize,
    /// Frontier left at the depth cap, marked explored without fetching.
    pub unfetched: usize,
    pub cloaked: Vec<CloakedUrl>,
}

impl CrawlReport {
    pub fn print(&self) {
        println!("crawl");
        println!("  rounds: {}", self.rounds);
        println!("  urls fetched: {}", self.urls_fetched);
        println!("  malformed urls: {}", self.malformed);
        println!("  distinct responses: {}", self.groups);
        println!("  new contents: {}", self.new_contents);
        println!("  new urls: {}", self.new_urls);
        println!("  failed attempts: {}", self.failures);
        println!("  left at depth cap: {}", self.unfetched);
        println!("  cloaked urls: {}", self.cloaked.len());
        for cloaked in &self.cloaked {
            println!("    {} ({} responses)", cloaked.url, cloaked.groups.len());
        }
        println!("ok");
    }
}

pub struct CrawlScheduler<T: Transport> {
    fetcher: MultiAgentFetcher<T>,
    depth: usize,
    url_concurrency: usize,
}

impl<T: Transport> CrawlScheduler<T> {
    pub fn new(fetcher: MultiAgentFetcher<T>, depth: usize) -> Self {
        Self {
            fetcher,
            depth,
            url_concurrency: 1,
        }
    }

    pub fn from_config(transport: T, config: &CrawlConfig) -> Self {
        let fetcher =
            MultiAgentFetcher::new(transport, config.user_agents.clone(), config.timeout())
                .with_concurrency(config.identity_concurrency);
        Self::new(fetcher, config.depth).with_url_concurrency(config.url_concurrency)
    }

    pub fn with_url_concurrency(mut self, concurrency: usize) -> Self {
        self.url_concurrency = concurrency.max(1);
        self
    }

    /// Crawl starting from every unexplored URL in the store.
    pub async fn run<S: ProvenanceStore + ?Sized>(&self, store: &S) -> Result<CrawlReport> {
        let frontier = store.unexplored_urls().await?;
        self.crawl(store, frontier).await
    }

    /// Crawl starting from `seeds`, recording them first if needed.
    pub async fn run_from<S: ProvenanceStore + ?Sized>(
        &self,
        store: &S,
        seeds: &[String],
    ) -> Result<CrawlReport> {
        let mut frontier = Vec::new();
        for seed in seeds {
            record_url(store, seed).await?;
            if !is_processed(store, seed).await? && !frontier.contains(seed) {
                frontier.push(seed.clone());
            }
        }
        self.crawl(store, frontier).await
    }

    async fn crawl<S: ProvenanceStore + ?Sized>(
        &self,
        store: &S,
        mut current: Vec<String>,
    ) -> Result<CrawlReport> {
        let mut report = CrawlReport::default();
        let mut explored: HashSet<String> = HashSet::new();

        for round in 0..self.depth {
            if current.is_empty() {
                break;
            }
            tracing::info!(round, urls = current.len(), "crawl round");

            let next = self.fetch_round(store, &current, &mut report).await?;

            for url in &current {
                store.mark_explored(url).await?;
                explored.insert(url.clone());
            }
            report.rounds += 1;

            let mut frontier = Vec::new();
            for link in next {
                if explored.contains(&link) || is_processed(store, &link).await? {
                    continue;
                }
                frontier.push(link);
            }
            current = frontier;
        }

        for url in &current {
            store.mark_explored(url).await?;
        }
        report.unfetched = current.len();
        if report.unfetched > 0 {
            tracing::info!(urls = report.unfetched, "depth cap reached, frontier marked explored");
        }

        Ok(report)
    }

    /// Fetch one frontier and record the results in frontier order.
    /// Returns the links found, de-duplicated in discovery order.
    async fn fetch_round<S: ProvenanceStore + ?Sized>(
        &self,
        store: &S,
        current: &[String],
        report: &mut CrawlReport,
    ) -> Result<Vec<String>> {
        let fetcher = &self.fetcher;
        let outcomes: Vec<(&String, FetchOutcome)> = stream::iter(current.iter())
            .map(|url| async move {
                tracing::debug!(url = url.as_str(), "fetching");
                (url, fetcher.fetch(url).await)
            })
            .buffered(self.url_concurrency)
            .collect()
            .await;

        let mut next = Vec::new();
        let mut queued = HashSet::new();
        for (url, outcome) in &outcomes {
            if outcome.malformed {
                report.malformed += 1;
            } else {
                report.urls_fetched += 1;
                report.failures += outcome.failures.len();
            }
            report.groups += outcome.groups.len();
            if outcome.is_cloaked() {
                report.cloaked.push(CloakedUrl {
                    url: url.to_string(),
                    groups: outcome
                        .groups
                        .iter()
                        .map(|g| g.identities.clone())
                        .collect(),
                });
            }

            for group in &outcome.groups {
                let content =
                    record_content(store, &group.item, url, &group.identities).await?;
                if content.is_new {
                    report.new_contents += 1;
                }

                let links = group.item.extract_links();
                let referrer = Referrer::Url {
                    source: url,
                    identities: &group.identities,
                };
                report.new_urls += record_links(store, &links, &referrer).await?.new_urls;
                for link in links {
                    if queued.insert(link.clone()) {
                        next.push(link);
                    }
                }
            }
        }

        Ok(next)
    }
}

async fn is_processed<S: ProvenanceStore + ?Sized>(store: &S, url: &str) -> Result<bool> {
    Ok(store
        .find_url(url)
        .await?
        .map(|record| record.processed)
        .unwrap_or(false))
}
