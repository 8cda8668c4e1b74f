//! Single-fetch transport.
//!
//! A [`Transport`] performs exactly one request for one URL under one
//! identity and classifies any failure. The [`HttpTransport`] implementation
//! uses `reqwest`; tests substitute scripted transports.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Raw response from a single fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub body: Vec<u8>,
    /// Response headers with lowercase names, in arrival order.
    pub headers: Vec<(String, String)>,
}

impl FetchedResponse {
    pub fn new(body: Vec<u8>, headers: Vec<(String, String)>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self { body, headers }
    }

    /// First value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Classified failure of a single fetch attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("malformed url: {0}")]
    MalformedUrl(String),
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("host or protocol unreachable: {0}")]
    Unreachable(String),
    #[error("http status {code}: {reason}")]
    HttpStatus { code: u16, reason: String },
    #[error("timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Failures that do not depend on the identity presented. Retrying the
    /// same URL with another identity cannot succeed.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FetchError::MalformedUrl(_) | FetchError::UnsupportedScheme(_) | FetchError::Unreachable(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::MalformedUrl(_) => "malformed-url",
            FetchError::UnsupportedScheme(_) | FetchError::Unreachable(_) => "unreachable",
            FetchError::HttpStatus { .. } => "http-status",
            FetchError::Timeout => "timeout",
            FetchError::Other(_) => "other",
        }
    }
}

/// Performs one request for `url` presenting `identity` as the user agent.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        identity: &str,
        timeout: Duration,
    ) -> Result<FetchedResponse, FetchError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn fetch(
        &self,
        url: &str,
        identity: &str,
        timeout: Duration,
    ) -> Result<FetchedResponse, FetchError> {
        (**self).fetch(url, identity, timeout).await
    }
}

/// `reqwest`-backed transport sharing one connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &str,
        identity: &str,
        timeout: Duration,
    ) -> Result<FetchedResponse, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::MalformedUrl(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        }

        let response = self
            .client
            .get(parsed)
            .header(reqwest::header::USER_AGENT, identity)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?;

        Ok(FetchedResponse::new(body.to_vec(), headers))
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_builder() {
        FetchError::MalformedUrl(err.to_string())
    } else if err.is_connect() {
        FetchError::Unreachable(err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
        }
    } else {
        FetchError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_sends_identity_as_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "agent-a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<a href=\"/next\">n</a>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .fetch(&format!("{}/page", server.uri()), "agent-a", TIMEOUT)
            .await
            .unwrap();

        assert_eq!(response.header("Content-Type"), Some("text/html; charset=utf-8"));
        assert_eq!(response.body, b"<a href=\"/next\">n</a>");
    }

    #[tokio::test]
    async fn test_status_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .fetch(&server.uri(), "agent-a", TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FetchError::HttpStatus {
                code: 403,
                reason: "Forbidden".to_string()
            }
        );
        assert!(!err.is_structural());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .fetch(&server.uri(), "agent-a", Duration::from_millis(100))
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Timeout);
        assert!(!err.is_structural());
    }

    #[tokio::test]
    async fn test_non_http_scheme_is_structural() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .fetch("mailto:someone@example.com", "agent-a", TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::UnsupportedScheme("mailto".to_string()));
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn test_malformed_url() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .fetch("no scheme here", "agent-a", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedUrl(_)));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = FetchedResponse::new(
            Vec::new(),
            vec![("Refresh".to_string(), "0; url=/x".to_string())],
        );
        assert_eq!(response.header("refresh"), Some("0; url=/x"));
        assert_eq!(response.header("REFRESH"), Some("0; url=/x"));
        assert_eq!(response.header("content-type"), None);
    }
}
