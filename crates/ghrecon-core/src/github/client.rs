//! HTTPS client, token resolution, and the rate-limit probe.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use super::error::ApiError;

/// Maximum response body size to read (64KB). Rate-limit payloads are
/// tiny; anything larger is truncated before it can exhaust memory.
const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;

/// Overall timeout for a single probe request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback reset delay reported when the probe itself fails.
const SENTINEL_RESET_DELAY: Duration = Duration::from_secs(5);

/// Persistent HTTPS client shared across probe calls.
type PersistentHttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Remaining API quota and the delay until it resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    /// Total quota; -1 when unknown.
    pub limit: i64,
    /// Remaining quota; -1 when unknown.
    pub remaining: i64,
    /// Delay until the quota resets.
    pub reset_in: Duration,
}

impl RateLimits {
    /// The value reported when the probe call fails, so callers can
    /// still print a consistent diagnostic.
    #[must_use]
    pub const fn sentinel() -> Self {
        Self {
            limit: -1,
            remaining: -1,
            reset_in: SENTINEL_RESET_DELAY,
        }
    }
}

/// Queries the API for remaining core/search quota.
///
/// Implementations never fail: a probe that cannot reach the API
/// reports [`RateLimits::sentinel`].
pub trait RateLimitProbe: Send + Sync {
    /// Returns the current limits; `core` selects the core quota,
    /// otherwise the search quota is reported.
    fn rate_limits(&self, core: bool) -> RateLimits;
}

/// Fixed-response probe for tests.
#[derive(Debug, Clone)]
pub struct MockRateLimitProbe {
    limits: RateLimits,
}

impl MockRateLimitProbe {
    /// Creates a probe that always reports the given limits.
    #[must_use]
    pub const fn new(limits: RateLimits) -> Self {
        Self { limits }
    }
}

impl Default for MockRateLimitProbe {
    fn default() -> Self {
        Self::new(RateLimits {
            limit: 5000,
            remaining: 5000,
            reset_in: Duration::from_secs(3600),
        })
    }
}

impl RateLimitProbe for MockRateLimitProbe {
    fn rate_limits(&self, _core: bool) -> RateLimits {
        self.limits
    }
}

/// Resolves the configured OAuth token value.
///
/// A value containing `/` is treated as a file path and the token read
/// from that file; the sentinel `-` means anonymous (public) access;
/// anything else is the token itself, typically taken from an
/// environment variable.
///
/// # Errors
///
/// Returns an error if the value names a file that cannot be read.
pub fn resolve_token(raw: &str) -> io::Result<Option<SecretString>> {
    let raw = raw.trim();
    if raw == "-" || raw.is_empty() {
        return Ok(None);
    }
    if raw.contains('/') {
        let text = fs::read_to_string(Path::new(raw))?;
        return Ok(Some(SecretString::from(text.trim().to_string())));
    }
    Ok(Some(SecretString::from(raw.to_string())))
}

/// GitHub API client.
///
/// HTTPS-only; the connector and client are lazily initialized once and
/// reused so repeated probes do not re-handshake TLS.
pub struct GithubClient {
    api_base_url: String,
    token: Option<SecretString>,
    http: OnceLock<PersistentHttpsClient>,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_base_url", &self.api_base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    /// Creates a client against the given API base URL
    /// (`https://api.github.com` for the public API).
    #[must_use]
    pub fn new(api_base_url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            token,
            http: OnceLock::new(),
        }
    }

    fn get_or_init_client(&self) -> &PersistentHttpsClient {
        self.http.get_or_init(|| {
            // https_only: the token must never travel over plain HTTP.
            let https = HttpsConnectorBuilder::new()
                .with_webpki_roots()
                .https_only()
                .enable_http1()
                .enable_http2()
                .build();
            Client::builder(TokioExecutor::new()).build(https)
        })
    }

    fn build_request(&self, path: &str) -> Result<http::Request<Full<Bytes>>, ApiError> {
        let url = format!("{}/{}", self.api_base_url.trim_end_matches('/'), path);
        let mut builder = http::Request::builder()
            .method("GET")
            .uri(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "ghrecon/0.1")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }
        builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let request = self.build_request(path)?;
        let response = self
            .get_or_init_client()
            .request(request)
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();

        if status == http::StatusCode::FORBIDDEN || status == http::StatusCode::TOO_MANY_REQUESTS {
            // A Retry-After header marks the secondary (abuse) limit;
            // plain quota exhaustion carries X-RateLimit-Reset instead.
            if let Some(retry_after) = header_u64(&headers, "Retry-After") {
                return Err(ApiError::AbuseThrottled {
                    retry_after_secs: retry_after,
                });
            }
            let reset_in_secs = header_u64(&headers, "X-RateLimit-Reset")
                .map_or(0, |reset| reset.saturating_sub(unix_now()));
            return Err(ApiError::RateLimited { reset_in_secs });
        }
        if status == http::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("GET {path}")));
        }

        let body = Limited::new(response.into_body(), MAX_RESPONSE_BODY_SIZE)
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|_| ApiError::Network("body read failed or size limit exceeded".to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Unexpected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::Unexpected {
            status: status.as_u16(),
            body: format!("invalid JSON: {e}"),
        })
    }

    /// Fetches the current rate limits from `GET /rate_limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload does not
    /// carry the expected resource block.
    pub fn fetch_rate_limits(&self, core: bool) -> Result<RateLimits, ApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let payload = runtime.block_on(async {
            tokio::time::timeout(REQUEST_TIMEOUT, self.get_json("rate_limit"))
                .await
                .map_err(|_| ApiError::Network("rate limit request timed out".to_string()))?
        })?;

        let resource = if core { "core" } else { "search" };
        let block = payload
            .get("resources")
            .and_then(|r| r.get(resource))
            .ok_or_else(|| ApiError::Unexpected {
                status: 200,
                body: format!("rate limit payload missing resources.{resource}"),
            })?;

        let reset_epoch = block.get("reset").and_then(serde_json::Value::as_u64);
        // One second past the reported reset instant.
        let reset_in = reset_epoch.map_or(SENTINEL_RESET_DELAY, |reset| {
            Duration::from_secs(reset.saturating_sub(unix_now()) + 1)
        });

        Ok(RateLimits {
            limit: block.get("limit").and_then(serde_json::Value::as_i64).unwrap_or(-1),
            remaining: block
                .get("remaining")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(-1),
            reset_in,
        })
    }
}

impl RateLimitProbe for GithubClient {
    fn rate_limits(&self, core: bool) -> RateLimits {
        match self.fetch_rate_limits(core) {
            Ok(limits) => limits,
            Err(err) => {
                warn!(error = %err, core, "rate limit probe failed");
                RateLimits::sentinel()
            },
        }
    }
}

fn header_u64(headers: &http::HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
