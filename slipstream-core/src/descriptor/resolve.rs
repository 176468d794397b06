//! Leaf source resolvers.
//!
//! Local files resolve synchronously from the file handle alone. Remote
//! files resolve a stable content identifier first, so downstream readers
//! can key caching and deduplication on it; resolution failures degrade to
//! an absent identifier rather than failing the input set.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

use super::{ContentId, DataSourceDescriptor};
use crate::config::ResolutionConfig;

/// A remote URL accepted as input, carrying its resolved content identifier.
///
/// Created when a remote URL is accepted; consumed into a
/// [`DataSourceDescriptor::RemoteFile`] once resolution settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSourceHandle {
    /// Source location.
    pub url: Url,
    /// Stable content identifier; `None` when resolution failed or the
    /// server exposes nothing usable.
    pub content_id: Option<ContentId>,
}

impl RemoteSourceHandle {
    /// Consumes the handle into its leaf descriptor.
    pub fn into_descriptor(self) -> DataSourceDescriptor {
        DataSourceDescriptor::RemoteFile {
            url: self.url,
            content_id: self.content_id,
        }
    }
}

/// Errors raised while resolving a remote content identifier.
///
/// These never abort an input set; callers downgrade them to an absent
/// identifier.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The HTTP request for the URL failed or returned an error status.
    #[error("HTTP error resolving {url}")]
    Http {
        /// URL that was being resolved.
        url: Url,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The server response carried no validator header to derive an
    /// identifier from.
    #[error("No usable validator headers for {url}")]
    NoValidator {
        /// URL that was being resolved.
        url: Url,
    },
}

/// Resolves stable content identifiers for remote source URLs.
///
/// The concrete transport behind a resolver is an external concern; tests
/// substitute scripted implementations.
#[async_trait]
pub trait ContentIdResolver: Send + Sync {
    /// Resolves a content identifier for the URL.
    ///
    /// # Errors
    /// - `ResolveError::Http` - request failed
    /// - `ResolveError::NoValidator` - nothing stable to derive an id from
    async fn resolve(&self, url: &Url) -> Result<ContentId, ResolveError>;
}

/// HTTP resolver deriving content identifiers from validator headers.
///
/// Issues a HEAD request and hashes the URL together with the strongest
/// validator the server exposes (ETag, falling back to Last-Modified).
/// Results are memoized per URL so repeated input-set builds do not re-fetch.
pub struct HttpContentIdResolver {
    client: reqwest::Client,
    cache: Mutex<LruCache<Url, ContentId>>,
}

impl HttpContentIdResolver {
    /// Creates a resolver from the resolution configuration.
    ///
    /// # Errors
    /// - `reqwest::Error` - the HTTP client could not be constructed
    pub fn new(config: &ResolutionConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()?;
        let capacity =
            NonZeroUsize::new(config.content_id_cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }
}

#[async_trait]
impl ContentIdResolver for HttpContentIdResolver {
    async fn resolve(&self, url: &Url) -> Result<ContentId, ResolveError> {
        if let Some(cached) = self.cache.lock().get(url) {
            return Ok(*cached);
        }

        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| ResolveError::Http {
                url: url.clone(),
                source,
            })?;

        let headers = response.headers();
        let validator = headers
            .get(reqwest::header::ETAG)
            .or_else(|| headers.get(reqwest::header::LAST_MODIFIED))
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ResolveError::NoValidator { url: url.clone() })?;

        let content_id = ContentId::digest_of(&[url.as_str().as_bytes(), validator.as_bytes()]);
        self.cache.lock().put(url.clone(), content_id);
        debug!(%url, %content_id, "Resolved remote content identifier");
        Ok(content_id)
    }
}

/// Resolves a local file into its leaf descriptor.
///
/// Synchronous and infallible for a well-formed handle; whether the file
/// can actually be opened is decided later by the reader that consumes the
/// descriptor.
pub fn resolve_local(path: PathBuf) -> DataSourceDescriptor {
    DataSourceDescriptor::LocalFile { path }
}

/// Resolves one remote URL into a handle.
///
/// A resolution failure degrades to an absent content identifier; the
/// source stays usable without identifier-keyed caching.
pub async fn resolve_remote(url: Url, resolver: &dyn ContentIdResolver) -> RemoteSourceHandle {
    match resolver.resolve(&url).await {
        Ok(content_id) => RemoteSourceHandle {
            url,
            content_id: Some(content_id),
        },
        Err(error) => {
            warn!(%url, %error, "Remote content-id resolution degraded; continuing without identifier");
            RemoteSourceHandle {
                url,
                content_id: None,
            }
        }
    }
}

/// Resolves every URL of an input set concurrently.
///
/// All resolutions run at once; the result preserves input order and is
/// only returned after every resolution settles, success or graceful
/// absence.
pub async fn resolve_remote_set(
    urls: Vec<Url>,
    resolver: &dyn ContentIdResolver,
) -> Vec<RemoteSourceHandle> {
    let futures = urls
        .into_iter()
        .map(|url| resolve_remote(url, resolver))
        .collect::<Vec<_>>();
    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Resolver that succeeds for URLs containing "ok" and fails otherwise,
    /// counting concurrent in-flight resolutions.
    struct ScriptedResolver {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedResolver {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentIdResolver for ScriptedResolver {
        async fn resolve(&self, url: &Url) -> Result<ContentId, ResolveError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.as_str().contains("ok") {
                Ok(ContentId::digest_of(&[url.as_str().as_bytes()]))
            } else {
                Err(ResolveError::NoValidator { url: url.clone() })
            }
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test url")
    }

    #[test]
    fn test_resolve_local_is_plain_leaf() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.rec");
        let descriptor = resolve_local(path.clone());
        assert_eq!(descriptor, DataSourceDescriptor::LocalFile { path });
    }

    #[tokio::test]
    async fn test_failed_resolution_degrades_to_absent_id() {
        let resolver = ScriptedResolver::new();
        let handle = resolve_remote(url("https://example.com/missing.rec"), &resolver).await;
        assert_eq!(handle.content_id, None);

        // The handle still consumes into a usable descriptor.
        let descriptor = handle.into_descriptor();
        assert!(matches!(
            descriptor,
            DataSourceDescriptor::RemoteFile {
                content_id: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_set_resolution_preserves_order_and_mixes_outcomes() {
        let resolver = ScriptedResolver::new();
        let handles = resolve_remote_set(
            vec![
                url("https://example.com/ok-first.rec"),
                url("https://example.com/broken.rec"),
                url("https://example.com/ok-last.rec"),
            ],
            &resolver,
        )
        .await;

        assert_eq!(handles.len(), 3);
        assert!(handles[0].content_id.is_some());
        assert!(handles[1].content_id.is_none());
        assert!(handles[2].content_id.is_some());
        assert!(handles[0].url.as_str().contains("ok-first"));
    }

    #[tokio::test]
    async fn test_set_resolution_runs_concurrently() {
        let resolver = ScriptedResolver::new();
        resolve_remote_set(
            vec![
                url("https://example.com/ok-a.rec"),
                url("https://example.com/ok-b.rec"),
            ],
            &resolver,
        )
        .await;
        assert!(resolver.max_in_flight.load(Ordering::SeqCst) >= 2);
    }
}
