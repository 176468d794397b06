//! Scriptable content-id resolvers.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use slipstream_core::descriptor::resolve::ResolveError;
use slipstream_core::descriptor::{ContentId, ContentIdResolver};
use url::Url;

/// Resolver with per-URL scripted outcomes and delays.
///
/// Unscripted URLs resolve instantly to a digest of the URL itself.
/// Delays let tests overlap resolutions deliberately, for example to force
/// a stale build result to arrive after a newer request.
#[derive(Debug, Clone, Default)]
pub struct ScriptedContentIdResolver {
    ids: HashMap<String, ContentId>,
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
}

impl ScriptedContentIdResolver {
    /// Creates a resolver where every URL resolves instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a fixed content id for a URL.
    pub fn with_id(mut self, url: &Url, id: ContentId) -> Self {
        self.ids.insert(url.to_string(), id);
        self
    }

    /// Scripts a delay before a URL resolves.
    pub fn with_delay(mut self, url: &Url, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Scripts a resolution failure for a URL.
    pub fn with_failure(mut self, url: &Url) -> Self {
        self.failures.insert(url.to_string());
        self
    }
}

#[async_trait]
impl ContentIdResolver for ScriptedContentIdResolver {
    async fn resolve(&self, url: &Url) -> Result<ContentId, ResolveError> {
        if let Some(delay) = self.delays.get(url.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.contains(url.as_str()) {
            return Err(ResolveError::NoValidator { url: url.clone() });
        }
        Ok(self
            .ids
            .get(url.as_str())
            .copied()
            .unwrap_or_else(|| ContentId::digest_of(&[url.as_str().as_bytes()])))
    }
}
