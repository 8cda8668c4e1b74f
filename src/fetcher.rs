//! Multi-identity retrieval and response grouping.
//!
//! [`MultiAgentFetcher::fetch`] requests one URL once per identity in the
//! roster and groups equal responses. One group spanning the whole roster
//! means the resource does not vary by requester; several groups mean the
//! server is serving different content to different identities.
//!
//! # Failure policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | URL does not parse | empty result, no request made |
//! | structural ([`FetchError::is_structural`]) | remaining identities skipped, empty result |
//! | anything else | that identity contributes no group, others continue |
//!
//! Attempts may run concurrently (`identity_concurrency`), but results are
//! consumed in roster order, so the grouping and the order of identities
//! inside each group do not depend on completion order.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;

use crate::content::RetrievedItem;
use crate::transport::{FetchError, Transport};

/// One distinct response and the identities that received it.
#[derive(Debug, Clone)]
pub struct FetchGroup {
    pub item: RetrievedItem,
    /// Identities in roster order.
    pub identities: Vec<String>,
}

/// Per-identity failure recorded during a fetch call.
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub url: String,
    pub identity: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Outcome of fetching one URL with the whole roster.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub groups: Vec<FetchGroup>,
    pub failures: Vec<FetchFailure>,
    /// Set when a structural failure ended the call early.
    pub aborted: bool,
    /// Set when the URL did not parse; no request was made.
    pub malformed: bool,
}

impl FetchOutcome {
    /// Whether identities disagreed about the response.
    pub fn is_cloaked(&self) -> bool {
        self.groups.len() > 1
    }
}

pub struct MultiAgentFetcher<T: Transport> {
    transport: T,
    roster: Vec<String>,
    timeout: Duration,
    concurrency: usize,
}

impl<T: Transport> MultiAgentFetcher<T> {
    pub fn new(transport: T, roster: Vec<String>, timeout: Duration) -> Self {
        Self {
            transport,
            roster,
            timeout,
            concurrency: 1,
        }
    }

    /// Number of identity attempts allowed in flight for one URL.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetch `url` with every identity and group equal responses.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        if let Err(err) = url::Url::parse(url) {
            tracing::warn!(url, error = %err, "invalid url, not fetched");
            outcome.failures.push(FetchFailure {
                url: url.to_string(),
                identity: String::new(),
                kind: "malformed-url",
                reason: err.to_string(),
            });
            outcome.malformed = true;
            return outcome;
        }

        let attempts = stream::iter(self.roster.iter())
            .map(|identity| async move {
                let result = self.transport.fetch(url, identity, self.timeout).await;
                (identity, result)
            })
            .buffered(self.concurrency);
        futures::pin_mut!(attempts);

        while let Some((identity, result)) = attempts.next().await {
            match result {
                Ok(response) => {
                    let item = RetrievedItem::from_response(url, &response);
                    match outcome.groups.iter_mut().find(|group| group.item == item) {
                        Some(group) => group.identities.push(identity.clone()),
                        None => outcome.groups.push(FetchGroup {
                            item,
                            identities: vec![identity.clone()],
                        }),
                    }
                }
                Err(err) if err.is_structural() => {
                    tracing::warn!(
                        url,
                        identity = identity.as_str(),
                        error = %err,
                        "identity-independent failure, skipping remaining identities"
                    );
                    outcome.failures.push(failure(url, identity, &err));
                    outcome.groups.clear();
                    outcome.aborted = true;
                    return outcome;
                }
                Err(err) => {
                    tracing::warn!(url, identity = identity.as_str(), error = %err, "fetch failed");
                    outcome.failures.push(failure(url, identity, &err));
                }
            }
        }

        outcome
    }
}

fn failure(url: &str, identity: &str, err: &FetchError) -> FetchFailure {
    FetchFailure {
        url: url.to_string(),
        identity: identity.to_string(),
        kind: err.kind(),
        reason: err.to_string(),
    }
}
