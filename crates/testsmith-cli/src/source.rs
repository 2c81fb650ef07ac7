//! Where source files come from: the local filesystem or a GitHub repository.

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

/// Default GitHub REST endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Prefix selecting the GitHub source on the command line.
pub const GITHUB_PREFIX: &str = "github:";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Retrieves the text of one source file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<String, FetchError>;
}

/// Reads files from disk.
pub struct LocalFileSource;

#[async_trait]
impl SourceFetcher for LocalFileSource {
    async fn fetch(&self, location: &str) -> Result<String, FetchError> {
        let path = PathBuf::from(location);
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(path.display().to_string())
            } else {
                FetchError::Upstream(format!("{}: {}", path.display(), e))
            }
        })
    }
}

/// `owner/repo:path[@ref]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubLocation {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub reference: Option<String>,
}

impl FromStr for GithubLocation {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FetchError::NotFound(format!("expected owner/repo:path[@ref], got `{}`", s));

        let (repo_part, rest) = s.split_once(':').ok_or_else(invalid)?;
        let (owner, repo) = repo_part.split_once('/').ok_or_else(invalid)?;
        let (path, reference) = match rest.rsplit_once('@') {
            Some((path, reference)) if !reference.is_empty() => (path, Some(reference.to_string())),
            _ => (rest, None),
        };
        let path = path.trim_start_matches('/');

        if owner.is_empty() || repo.is_empty() || path.is_empty() {
            return Err(invalid());
        }
        Ok(GithubLocation {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            reference,
        })
    }
}

#[derive(Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// Decode a contents-API body into file text.
pub(crate) fn decode_contents(body: &str) -> Result<String, FetchError> {
    let response: ContentsResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Upstream(format!("invalid contents response: {}", e)))?;

    if let Some(encoding) = response.encoding.as_deref() {
        if encoding != "base64" {
            return Err(FetchError::Upstream(format!("unsupported encoding `{}`", encoding)));
        }
    }
    let content = response
        .content
        .ok_or_else(|| FetchError::Upstream("response has no file content".to_string()))?;

    // The API wraps base64 at 60 columns.
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| FetchError::Upstream(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes).map_err(|_| FetchError::Upstream("file is not UTF-8".to_string()))
}

/// Map a non-success status onto the fetch taxonomy.
pub(crate) fn status_error(status: u16, rate_remaining: Option<&str>, what: &str) -> FetchError {
    match status {
        404 => FetchError::NotFound(what.to_string()),
        429 => FetchError::RateLimited(what.to_string()),
        403 if rate_remaining == Some("0") => FetchError::RateLimited(what.to_string()),
        _ => FetchError::Upstream(format!("{} returned HTTP {}", what, status)),
    }
}

/// GitHub contents API.
pub struct GithubSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubSource {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("testsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Upstream(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Public API, authenticated with `GITHUB_TOKEN` when set.
    pub fn from_env() -> Result<Self, FetchError> {
        Self::new(GITHUB_API_URL, std::env::var("GITHUB_TOKEN").ok())
    }

    fn contents_url(&self, location: &GithubLocation) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url, location.owner, location.repo, location.path
        )
    }
}

#[async_trait]
impl SourceFetcher for GithubSource {
    async fn fetch(&self, location: &str) -> Result<String, FetchError> {
        let location: GithubLocation = location.parse()?;
        let url = self.contents_url(&location);
        debug!(url = %url, reference = ?location.reference, "fetching source from GitHub");

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(reference) = &location.reference {
            request = request.query(&[("ref", reference)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(status_error(status.as_u16(), remaining.as_deref(), &url));
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;
        decode_contents(&body)
    }
}

/// Fetch `location`, choosing the GitHub source for `github:` references.
pub async fn fetch_source(location: &str) -> Result<String, FetchError> {
    match location.strip_prefix(GITHUB_PREFIX) {
        Some(remote) => GithubSource::from_env()?.fetch(remote).await,
        None => LocalFileSource.fetch(location).await,
    }
}
