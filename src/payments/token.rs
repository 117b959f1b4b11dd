//! Bearer token cache keyed by short code.
//!
//! Each short code owns an async mutex around its cached token. A caller that
//! finds the token missing or expired refreshes it while holding that mutex,
//! so concurrent callers for the same short code wait for the single refresh
//! instead of issuing their own. Different short codes never contend beyond
//! the brief map lookup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use crate::payments::error::GatewayResult;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub short_code: String,
    pub access_token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    pub fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Token returned by the gateway together with how long it may be used.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub valid_for: Duration,
}

type Slot = Arc<Mutex<Option<CachedToken>>>;

#[derive(Debug, Default)]
pub struct TokenCache {
    slots: RwLock<HashMap<String, Slot>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, short_code: &str) -> Slot {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(short_code) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots.entry(short_code.to_string()).or_default().clone()
    }

    /// Live token for `short_code`, if any.
    pub async fn get(&self, short_code: &str) -> Option<String> {
        let slot = self.slot(short_code).await;
        let guard = slot.lock().await;
        guard
            .as_ref()
            .filter(|token| token.is_live())
            .map(|token| token.access_token.clone())
    }

    /// Return the cached token or run `refresh` to obtain a new one.
    pub async fn get_or_refresh<F, Fut>(&self, short_code: &str, refresh: F) -> GatewayResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<IssuedToken>>,
    {
        let slot = self.slot(short_code).await;
        let mut guard = slot.lock().await;

        if let Some(token) = guard.as_ref().filter(|token| token.is_live()) {
            return Ok(token.access_token.clone());
        }

        let issued = refresh().await?;
        debug!(
            short_code = %short_code,
            valid_for_secs = issued.valid_for.as_secs(),
            "access token refreshed"
        );

        *guard = Some(CachedToken {
            short_code: short_code.to_string(),
            access_token: issued.access_token.clone(),
            expires_at: Instant::now() + issued.valid_for,
        });

        Ok(issued.access_token)
    }

    /// Drop the cached token, e.g. after the gateway rejected it.
    pub async fn invalidate(&self, short_code: &str) {
        let slot = self.slot(short_code).await;
        *slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::GatewayError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn issued(token: &str, secs: u64) -> IssuedToken {
        IssuedToken {
            access_token: token.to_string(),
            valid_for: Duration::from_secs(secs),
        }
    }

    #[tokio::test]
    async fn test_concurrent_misses_refresh_once() {
        let cache = Arc::new(TokenCache::new());
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let fetches = fetches.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh("600000", || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(issued("tok-1", 3480))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "tok-1");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_is_replaced() {
        let cache = TokenCache::new();

        let first = cache
            .get_or_refresh("600000", || async { Ok(issued("tok-1", 60)) })
            .await
            .unwrap();
        assert_eq!(first, "tok-1");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("600000").await, None);

        let second = cache
            .get_or_refresh("600000", || async { Ok(issued("tok-2", 60)) })
            .await
            .unwrap();
        assert_eq!(second, "tok-2");
    }

    #[tokio::test]
    async fn test_short_codes_are_cached_independently() {
        let cache = TokenCache::new();
        cache
            .get_or_refresh("600000", || async { Ok(issued("tok-a", 3480)) })
            .await
            .unwrap();
        cache
            .get_or_refresh("600111", || async { Ok(issued("tok-b", 3480)) })
            .await
            .unwrap();

        assert_eq!(cache.get("600000").await.as_deref(), Some("tok-a"));
        assert_eq!(cache.get("600111").await.as_deref(), Some("tok-b"));

        cache.invalidate("600000").await;
        assert_eq!(cache.get("600000").await, None);
        assert_eq!(cache.get("600111").await.as_deref(), Some("tok-b"));
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_cache_empty() {
        let cache = TokenCache::new();
        let result = cache
            .get_or_refresh("600000", || async {
                Err(GatewayError::http(400, "Bad Request: Invalid Credentials", None))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.get("600000").await, None);
    }
}
