//! One shared [`ApiClient`] per base URL.
//!
//! The registry is constructed by the application and passed to whatever
//! needs HTTP access. Clients are created on first use and kept for the
//! lifetime of the registry; clones of the registry share the same map.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use http::HeaderMap;
#[cfg(feature = "telemetry")]
use tracing::debug;

use crate::client::{ApiClient, HttpError, normalize_base_url};
use crate::retry::RetryPolicy;

/// Lazily populated map from normalized base URL to [`ApiClient`].
#[derive(Clone, Debug, Default)]
pub struct ClientRegistry {
    clients: Arc<DashMap<String, ApiClient>>,
    policy: RetryPolicy,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ClientRegistry {
    /// Creates an empty registry whose clients use `policy`.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Headers attached to every client created after this call.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Per-attempt timeout for every client created after this call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the client for `base_url`, creating it on first use.
    ///
    /// URLs differing only in trailing slashes share a client.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::UrlParse`] if `base_url` is not an absolute URL.
    pub fn client(&self, base_url: &str) -> Result<ApiClient, HttpError> {
        let url = normalize_base_url(base_url)?;
        if let Some(existing) = self.clients.get(url.as_str()) {
            return Ok(existing.value().clone());
        }
        let client = self.build(url.clone());
        let entry = self
            .clients
            .entry(url.as_str().to_owned())
            .or_insert_with(|| {
                #[cfg(feature = "telemetry")]
                debug!(base_url = %url, "created http client");
                client
            });
        Ok(entry.value().clone())
    }

    /// Number of clients created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no client has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn build(&self, url: url::Url) -> ApiClient {
        let client = ApiClient::with_retry_policy(url, self.policy).with_headers(self.headers.clone());
        match self.timeout {
            Some(timeout) => client.with_timeout(timeout),
            None => client,
        }
    }
}
