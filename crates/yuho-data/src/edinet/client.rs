//! EDINET API v2 client with rate limiting and bounded retries.

use crate::edinet::documents::{DocId, DocumentList};
use crate::error::{DataError, Result};
use crate::retry::{RetryDecision, RetryPolicy};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// EDINET API v2 base URL
pub const EDINET_BASE_URL: &str = "https://api.edinet-fsa.go.jp/api/v2";

/// `type` parameter of the document-list endpoint (full metadata)
pub const DOCUMENT_LIST_TYPE: &str = "2";

/// Default minimum spacing between requests
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(200);

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("yuho-edinet-fetch/", env!("CARGO_PKG_VERSION"));

/// Artifact types served by `GET /documents/{docID}?type=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    /// Submission bundle with XBRL (`type=1`, ZIP)
    PrimaryBundle,
    /// PDF rendition (`type=2`)
    Pdf,
    /// Supplementary attachments (`type=3`, ZIP)
    Attachments,
}

impl ArtifactKind {
    /// All kinds in download order.
    pub const ALL: [Self; 3] = [Self::PrimaryBundle, Self::Pdf, Self::Attachments];

    /// Numeric `type` query value.
    pub const fn code(&self) -> u8 {
        match self {
            Self::PrimaryBundle => 1,
            Self::Pdf => 2,
            Self::Attachments => 3,
        }
    }

    /// Whether the artifact is a ZIP archive that can be extracted.
    pub const fn is_archive(&self) -> bool {
        matches!(self, Self::PrimaryBundle | Self::Attachments)
    }

    const fn accept(&self) -> &'static str {
        match self {
            Self::PrimaryBundle | Self::Attachments => "application/zip",
            Self::Pdf => "application/pdf",
        }
    }
}

/// Query parameters of the document-list endpoint, minus the key.
pub fn document_list_params(date: NaiveDate) -> Vec<(&'static str, String)> {
    vec![
        ("date", date.format("%Y-%m-%d").to_string()),
        ("type", DOCUMENT_LIST_TYPE.to_string()),
    ]
}

/// Source of raw daily document lists.
#[async_trait]
pub trait ListFetcher: Send + Sync {
    /// Fetch the raw `documents.json` payload for one day.
    async fn fetch_document_list(&self, date: NaiveDate) -> Result<Vec<u8>>;
}

/// Source of downloadable artifacts.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Download one artifact. `Ok(None)` means the document has no artifact
    /// of that kind.
    async fn fetch_artifact(&self, doc_id: &DocId, kind: ArtifactKind) -> Result<Option<Vec<u8>>>;

    /// Public URL of an artifact, without credentials.
    fn artifact_url(&self, doc_id: &DocId, kind: ArtifactKind) -> String;
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL (overridable for mirrors and tests)
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Minimum spacing between requests
    pub min_interval: Duration,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: EDINET_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            min_interval: DEFAULT_RATE_LIMIT,
            retry: RetryPolicy::default(),
        }
    }
}

/// A successful response body.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Raw bytes
    pub bytes: Vec<u8>,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
}

impl Fetched {
    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
    }
}

/// Rate limiter to keep requests spaced out
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            last_request: now.checked_sub(min_interval).unwrap_or(now),
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// EDINET API client
pub struct EdinetClient {
    client: reqwest::Client,
    api_key: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    base_url: String,
    retry: RetryPolicy,
}

impl EdinetClient {
    /// Create a client with default settings.
    ///
    /// # Errors
    /// Returns `DataError::MissingApiKey` when `api_key` is blank.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, ClientConfig::default())
    }

    /// Create a client with explicit settings.
    pub fn with_config(api_key: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(DataError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(config.min_interval))),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue an authenticated GET, retrying transient failures.
    ///
    /// # Arguments
    /// * `endpoint` - Path below the base URL, e.g. `/documents.json`
    /// * `query` - Query parameters; the subscription key is appended
    /// * `accept` - `Accept` header value
    pub async fn fetch(&self, endpoint: &str, query: &[(&str, String)], accept: &str) -> Result<Fetched> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(endpoint, query, accept).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => match self.retry.should_retry(&e, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next,
                    } => {
                        warn!(endpoint, attempt, error = %e, "transient failure, retrying");
                        sleep(delay).await;
                        attempt = next;
                    }
                    RetryDecision::DoNotRetry => return Err(e),
                },
            }
        }
    }

    async fn fetch_once(&self, endpoint: &str, query: &[(&str, String)], accept: &str) -> Result<Fetched> {
        let url = format!("{}{}", self.base_url, endpoint);
        let display_url = redacted_url(&url, query);

        self.rate_limiter.lock().await.wait().await;
        debug!(url = %display_url, "GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("Subscription-Key", self.api_key.as_str())])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| transport_error(e, &display_url))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::from_status(status.as_u16(), &display_url, body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, &display_url))?;

        Ok(Fetched {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[async_trait]
impl ListFetcher for EdinetClient {
    async fn fetch_document_list(&self, date: NaiveDate) -> Result<Vec<u8>> {
        let fetched = self
            .fetch("/documents.json", &document_list_params(date), "application/json")
            .await?;
        Ok(fetched.bytes)
    }
}

#[async_trait]
impl ArtifactSource for EdinetClient {
    async fn fetch_artifact(&self, doc_id: &DocId, kind: ArtifactKind) -> Result<Option<Vec<u8>>> {
        let endpoint = format!("/documents/{}", doc_id.as_str());
        let query = [("type", kind.code().to_string())];

        let fetched = match self.fetch(&endpoint, &query, kind.accept()).await {
            Ok(fetched) => fetched,
            Err(DataError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        // Errors for unavailable artifacts come back as a JSON body with 200.
        if fetched.is_json() {
            let url = self.artifact_url(doc_id, kind);
            return match DocumentList::from_slice(&fetched.bytes, &url) {
                Err(DataError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
                Ok(_) => Err(DataError::MalformedResponse {
                    url,
                    reason: "expected artifact bytes, got a JSON document".to_string(),
                }),
            };
        }

        Ok(Some(fetched.bytes))
    }

    fn artifact_url(&self, doc_id: &DocId, kind: ArtifactKind) -> String {
        format!("{}/documents/{}?type={}", self.base_url, doc_id.as_str(), kind.code())
    }
}

impl std::fmt::Debug for EdinetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdinetClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn redacted_url(url: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let params: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{url}?{}", params.join("&"))
}

fn transport_error(error: reqwest::Error, url: &str) -> DataError {
    if error.is_builder() {
        return DataError::Client(error);
    }
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    };
    DataError::TransientNetwork {
        url: url.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_rejected() {
        assert!(matches!(
            EdinetClient::new("   "),
            Err(DataError::MissingApiKey)
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let client = EdinetClient::new("secret-key").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains(EDINET_BASE_URL));
    }

    #[test]
    fn test_artifact_codes() {
        let codes: Vec<u8> = ArtifactKind::ALL.iter().map(ArtifactKind::code).collect();
        assert_eq!(codes, vec![1, 2, 3]);
        assert!(ArtifactKind::PrimaryBundle.is_archive());
        assert!(!ArtifactKind::Pdf.is_archive());
    }

    #[test]
    fn test_artifact_url_has_no_key() {
        let client = EdinetClient::new("secret-key").unwrap();
        let url = client.artifact_url(&DocId::new("S100ABCD"), ArtifactKind::Pdf);
        assert_eq!(url, format!("{EDINET_BASE_URL}/documents/S100ABCD?type=2"));
    }

    #[test]
    fn test_document_list_params() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 26).unwrap();
        let params = document_list_params(date);
        assert_eq!(params[0], ("date", "2024-06-26".to_string()));
        assert_eq!(params[1], ("type", "2".to_string()));
    }
}
