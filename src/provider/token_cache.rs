//! Single-flight, TTL-based bearer token cache.
//!
//! One cached token serves every outbound send. Expired reads funnel into a
//! single refresh guarded by an exclusive lock with a double-checked re-read,
//! so concurrent callers during a miss block on the same fetch instead of
//! issuing duplicates.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::Result;

/// Safety margin subtracted from the provider TTL to absorb clock skew and
/// request-in-flight races.
const TTL_MARGIN_SECS: u64 = 30;

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Shared access-token cache. The token never leaves this module except as
/// the return value of [`TokenCache::get`].
#[derive(Default)]
pub struct TokenCache {
    current: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl TokenCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, refreshing it through `fetch` when absent
    /// or expired.
    ///
    /// `fetch` yields `(token, ttl_seconds)`. The stored TTL is
    /// `max(ttl_seconds - 30, 30)`. On fetch failure the error propagates to
    /// every caller blocked on this refresh and the cache stays empty, so
    /// the next call retries.
    ///
    /// # Errors
    ///
    /// Propagates the `fetch` failure unchanged.
    pub async fn get<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, u64)>>,
    {
        if let Some(token) = self.read_fresh().await {
            debug!("token cache hit");
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;

        // Double-check: a concurrent caller may have refreshed while this
        // caller was waiting for the lock.
        if let Some(token) = self.read_fresh().await {
            debug!("token cache hit after lock");
            return Ok(token);
        }

        info!("token cache refreshing");
        let (token, ttl_seconds) = match fetch().await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(%err, "token refresh failed");
                return Err(err);
            }
        };

        let effective_ttl = ttl_seconds.saturating_sub(TTL_MARGIN_SECS).max(TTL_MARGIN_SECS);
        let expires_at = Instant::now() + Duration::from_secs(effective_ttl);
        *self.current.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        info!(ttl_seconds, effective_ttl, "token cache refreshed");

        Ok(token)
    }

    /// Whether a usable token is currently cached.
    pub async fn is_populated(&self) -> bool {
        self.read_fresh().await.is_some()
    }

    async fn read_fresh(&self) -> Option<String> {
        let guard = self.current.read().await;
        guard
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.token.clone())
    }
}
