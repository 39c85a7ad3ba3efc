//! HTTP fetcher for downloading hosts file sources.
//!
//! Every guard failure is returned as a typed [`FetchError`]; the transfer is
//! aborted by dropping the response, so a hostile source never gets to stream
//! more than the configured cap.

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::{cache_key, get_or_miss, put_or_log, SharedCache};
use crate::config::Config;
use crate::error::FetchError;
use crate::hostsfile::normalize_newlines;
use crate::validation::is_valid_uri;

/// Fixed user agent sent with every request
pub const USER_AGENT: &str = concat!(
    "mikrohosts/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/tarampampam/mikrotik-hosts-parser)"
);

/// Cache namespace of fetched source bodies
const SOURCE_CACHE_NAMESPACE: &str = "source";

/// Tuning knobs of a [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Connect and total timeout per request
    pub timeout: Duration,
    /// Redirects followed before giving up
    pub max_redirects: usize,
    /// Body size cap in KiB
    pub max_size_kib: u64,
    /// Lower-case schemes allowed for the source and for redirect targets
    pub protocols: Vec<String>,
    /// Lifetime of a cached body
    pub cache_ttl: Duration,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_redirects: 2,
            max_size_kib: 2048,
            protocols: vec!["http".to_string(), "https".to_string()],
            cache_ttl: Duration::from_secs(7200),
        }
    }
}

impl FetcherOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.limits.fetch_timeout(),
            max_redirects: config.limits.max_redirects,
            max_size_kib: config.limits.max_source_size_kib,
            protocols: config
                .limits
                .protocols
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            cache_ttl: config.cache.source_ttl(),
        }
    }

    fn max_size_bytes(&self) -> u64 {
        self.max_size_kib.saturating_mul(1024)
    }
}

/// A successfully fetched, normalized source body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub body: String,
    pub from_cache: bool,
}

/// Accumulates a streamed body and aborts once it grows past the cap.
///
/// The `Content-Length` header is only a hint; this is the enforcement point
/// that does not trust it.
#[derive(Debug)]
pub struct BodyGuard {
    buf: Vec<u8>,
    limit_kib: u64,
}

impl BodyGuard {
    pub fn new(limit_kib: u64) -> Self {
        Self {
            buf: Vec::new(),
            limit_kib,
        }
    }

    /// Append a chunk, failing with [`FetchError::TooLarge`] past the cap.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), FetchError> {
        let total = (self.buf.len() + chunk.len()) as u64;
        if total > self.limit_kib.saturating_mul(1024) {
            return Err(FetchError::TooLarge {
                detected_by: "downloaded size",
                limit_kib: self.limit_kib,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Decode the body, replacing invalid UTF-8 sequences.
    pub fn into_string(self) -> String {
        match String::from_utf8(self.buf) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// Cache key of a source body
pub fn source_cache_key(uri: &str) -> String {
    cache_key(SOURCE_CACHE_NAMESPACE, &[uri])
}

/// HTTP client for fetching sources
pub struct Fetcher {
    client: Client,
    cache: SharedCache,
    options: FetcherOptions,
}

impl Fetcher {
    /// Create a new fetcher backed by the given source cache
    pub fn new(options: FetcherOptions, cache: SharedCache) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.timeout)
            .timeout(options.timeout)
            .redirect(redirect_policy(
                options.max_redirects,
                options.protocols.clone(),
            ))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            cache,
            options,
        })
    }

    pub fn options(&self) -> &FetcherOptions {
        &self.options
    }

    /// Fetch a source, answering from the source cache when possible
    pub async fn fetch(&self, uri: &str) -> Result<Fetched, FetchError> {
        if !is_valid_uri(uri) {
            return Err(FetchError::InvalidUri(uri.to_string()));
        }

        let scheme = uri
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.options.protocols.contains(&scheme) {
            return Err(FetchError::ProtocolNotAllowed(scheme));
        }

        let key = source_cache_key(uri);
        if let Some(body) = get_or_miss(self.cache.as_ref(), &key) {
            debug!("Cache hit for {}", uri);
            return Ok(Fetched {
                body,
                from_cache: true,
            });
        }

        info!("Fetching {}...", uri);
        let raw = self.download(uri).await?;
        let body = normalize_newlines(&raw);
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        put_or_log(self.cache.as_ref(), &key, &body, self.options.cache_ttl);
        debug!("Fetched {} ({} bytes)", uri, body.len());

        Ok(Fetched {
            body,
            from_cache: false,
        })
    }

    async fn download(&self, uri: &str) -> Result<String, FetchError> {
        let mut response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(FetchError::Transport(format!("HTTP {}", status)));
        }

        let limit_kib = self.options.max_size_kib;
        if let Some(length) = response.content_length() {
            if length > self.options.max_size_bytes() {
                return Err(FetchError::TooLarge {
                    detected_by: "header \"Content-Length\"",
                    limit_kib,
                });
            }
        }

        if let Some(value) = response.headers().get(CONTENT_TYPE) {
            let content_type = String::from_utf8_lossy(value.as_bytes()).into_owned();
            if !content_type.to_ascii_lowercase().contains("text/plain") {
                return Err(FetchError::InvalidContentType(content_type));
            }
        }

        let mut guard = BodyGuard::new(limit_kib);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(e))?
        {
            guard.push(&chunk)?;
        }

        Ok(guard.into_string())
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        let err = err.without_url();
        let mut message = if err.is_timeout() {
            format!("Timed out after {}s", self.options.timeout.as_secs_f32())
        } else {
            err.to_string()
        };

        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        FetchError::Transport(message)
    }
}

/// Redirect policy capping the count and re-checking the protocol allow-list
fn redirect_policy(max_redirects: usize, protocols: Vec<String>) -> Policy {
    Policy::custom(move |attempt| {
        // `previous` includes the original request
        if attempt.previous().len() > max_redirects {
            return attempt.error(format!("too many redirects (max: {})", max_redirects));
        }

        let scheme = attempt.url().scheme().to_string();
        if protocols.contains(&scheme) {
            attempt.follow()
        } else {
            attempt.error(format!("redirect to protocol \"{}\" is not allowed", scheme))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, MockCache};
    use crate::error::CacheError;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOSTS: &str = "# test list\r\n127.0.0.1 ads.example.com\r\n\r\n\r\n\r\n0.0.0.0 tracker.example.com\r\n";

    fn test_options() -> FetcherOptions {
        FetcherOptions {
            timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn fetcher_with(options: FetcherOptions) -> (Fetcher, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let fetcher = Fetcher::new(options, cache.clone()).unwrap();
        (fetcher, cache)
    }

    async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn plain(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/plain; charset=utf-8")
    }

    #[test]
    fn test_body_guard_within_limit() {
        let mut guard = BodyGuard::new(1);
        guard.push(&[b'a'; 512]).unwrap();
        guard.push(&[b'b'; 512]).unwrap();
        assert_eq!(guard.len(), 1024);
        assert_eq!(guard.into_string().len(), 1024);
    }

    #[test]
    fn test_body_guard_aborts_past_limit() {
        let mut guard = BodyGuard::new(1);
        guard.push(&[b'a'; 1000]).unwrap();
        let err = guard.push(&[b'a'; 25]).unwrap_err();
        assert_eq!(
            err,
            FetchError::TooLarge {
                detected_by: "downloaded size",
                limit_kib: 1
            }
        );
        assert_eq!(guard.len(), 1000);
    }

    #[test]
    fn test_body_guard_lossy_utf8() {
        let mut guard = BodyGuard::new(1);
        guard.push(b"ok \xff").unwrap();
        assert!(!guard.is_empty());
        assert_eq!(guard.into_string(), "ok \u{fffd}");
    }

    #[test]
    fn test_source_cache_key() {
        let key = source_cache_key("https://example.com/hosts");
        assert!(key.starts_with("source:"));
        assert_ne!(key, source_cache_key("https://example.com/hosts2"));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.limits.protocols = vec!["HTTPS".to_string()];
        config.limits.max_redirects = 4;
        let options = FetcherOptions::from_config(&config);
        assert_eq!(options.protocols, vec!["https"]);
        assert_eq!(options.max_redirects, 4);
        assert_eq!(options.max_size_bytes(), 2048 * 1024);
    }

    #[tokio::test]
    async fn test_fetch_normalizes_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hosts.txt"))
            .respond_with(plain(HOSTS))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, cache) = fetcher_with(test_options());
        let uri = format!("{}/hosts.txt", server.uri());

        let first = fetcher.fetch(&uri).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(
            first.body,
            "# test list\n127.0.0.1 ads.example.com\n\n0.0.0.0 tracker.example.com\n"
        );
        assert_eq!(cache.len(), 1);

        let second = fetcher.fetch(&uri).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, first.body);
    }

    #[tokio::test]
    async fn test_fetch_rejects_content_type() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/page",
            ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"),
        )
        .await;

        let (fetcher, cache) = fetcher_with(test_options());
        let err = fetcher
            .fetch(&format!("{}/page", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::InvalidContentType("text/html".to_string()));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_content_type_case_insensitive() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/hosts",
            ResponseTemplate::new(200).set_body_raw("0.0.0.0 a.com\n", "TEXT/PLAIN"),
        )
        .await;

        let (fetcher, _) = fetcher_with(test_options());
        assert!(fetcher
            .fetch(&format!("{}/hosts", server.uri()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_fetch_rejects_large_content_length() {
        let server = MockServer::start().await;
        serve(&server, "/big", plain(&"0.0.0.0 a.com\n".repeat(200))).await;

        let options = FetcherOptions {
            max_size_kib: 1,
            ..test_options()
        };
        let (fetcher, cache) = fetcher_with(options);
        let err = fetcher
            .fetch(&format!("{}/big", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit_kib: 1, .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let server = MockServer::start().await;
        serve(&server, "/missing", ResponseTemplate::new(404)).await;

        let (fetcher, _) = fetcher_with(test_options());
        let err = fetcher
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::Transport(message) => assert!(message.contains("404")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_empty_body_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(plain("\r\n\r\n  \n"))
            .expect(2)
            .mount(&server)
            .await;

        let (fetcher, cache) = fetcher_with(test_options());
        let uri = format!("{}/empty", server.uri());
        assert_eq!(fetcher.fetch(&uri).await.unwrap_err(), FetchError::EmptyBody);
        assert_eq!(fetcher.fetch(&uri).await.unwrap_err(), FetchError::EmptyBody);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/slow",
            plain("0.0.0.0 a.com\n").set_delay(Duration::from_secs(3)),
        )
        .await;

        let options = FetcherOptions {
            timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let (fetcher, _) = fetcher_with(options);
        let err = fetcher
            .fetch(&format!("{}/slow", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let (fetcher, _) = fetcher_with(test_options());
        let err = fetcher
            .fetch("http://127.0.0.1:1/hosts.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_uri_makes_no_request() {
        let (fetcher, _) = fetcher_with(test_options());
        let err = fetcher.fetch("not a uri").await.unwrap_err();
        assert_eq!(err, FetchError::InvalidUri("not a uri".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_protocol_not_allowed() {
        let options = FetcherOptions {
            protocols: vec!["https".to_string()],
            ..test_options()
        };
        let (fetcher, _) = fetcher_with(options);
        let err = fetcher
            .fetch("http://example.com/hosts")
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::ProtocolNotAllowed("http".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_follows_allowed_redirect() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/old",
            ResponseTemplate::new(302).insert_header("Location", "/new"),
        )
        .await;
        serve(&server, "/new", plain("0.0.0.0 moved.example.com\n")).await;

        let (fetcher, _) = fetcher_with(test_options());
        let fetched = fetcher
            .fetch(&format!("{}/old", server.uri()))
            .await
            .unwrap();
        assert_eq!(fetched.body, "0.0.0.0 moved.example.com\n");
    }

    #[tokio::test]
    async fn test_fetch_too_many_redirects() {
        let server = MockServer::start().await;
        for (from, to) in [("/r1", "/r2"), ("/r2", "/r3"), ("/r3", "/r4")] {
            serve(
                &server,
                from,
                ResponseTemplate::new(302).insert_header("Location", to),
            )
            .await;
        }
        serve(&server, "/r4", plain("0.0.0.0 a.com\n")).await;

        let (fetcher, _) = fetcher_with(test_options());
        let err = fetcher
            .fetch(&format!("{}/r1", server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::Transport(message) => assert!(message.contains("redirect")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_redirect_to_disallowed_protocol() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/ftp",
            ResponseTemplate::new(301).insert_header("Location", "ftp://example.com/hosts"),
        )
        .await;

        let (fetcher, _) = fetcher_with(test_options());
        let err = fetcher
            .fetch(&format!("{}/ftp", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_degrades_when_cache_unavailable() {
        let server = MockServer::start().await;
        serve(&server, "/hosts", plain("0.0.0.0 a.com\n")).await;

        let mut cache = MockCache::new();
        cache.expect_get().returning(|_| {
            Err(CacheError::Unavailable(std::io::Error::other("down")))
        });
        cache.expect_put().returning(|_, _, _| {
            Err(CacheError::Unavailable(std::io::Error::other("down")))
        });

        let fetcher = Fetcher::new(test_options(), Arc::new(cache)).unwrap();
        let fetched = fetcher
            .fetch(&format!("{}/hosts", server.uri()))
            .await
            .unwrap();
        assert!(!fetched.from_cache);
        assert_eq!(fetched.body, "0.0.0.0 a.com\n");
    }
}
