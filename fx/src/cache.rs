//! TTL cache in front of a rate provider.
//!
//! Batch recalculation looks up the same pair many times in a row; the cache
//! keeps that to one provider round trip per tenant and pair per TTL.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sarafi_common::{CurrencyPair, TenantId};
use std::sync::Arc;
use tracing::debug;

use crate::error::FxResult;
use crate::provider::{ExchangeRate, RateProvider};

#[derive(Debug, Clone)]
struct CacheEntry {
    rate: ExchangeRate,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_valid(&self, ttl: Duration) -> bool {
        Utc::now().signed_duration_since(self.cached_at) < ttl
    }
}

/// Wraps a provider and caches successful lookups.
///
/// Failed lookups are never cached.
pub struct CachedRateProvider {
    inner: Arc<dyn RateProvider>,
    cache: DashMap<(TenantId, CurrencyPair), CacheEntry>,
    ttl: Duration,
}

impl CachedRateProvider {
    /// Create a cache with the given TTL.
    pub fn new(inner: Arc<dyn RateProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Cached (tenant, pair) entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop entries older than the TTL.
    pub fn evict_expired(&self) {
        let ttl = self.ttl;
        self.cache.retain(|_, entry| entry.is_valid(ttl));
    }
}

#[async_trait]
impl RateProvider for CachedRateProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn current_rate(&self, tenant_id: TenantId, pair: &CurrencyPair) -> FxResult<ExchangeRate> {
        let key = (tenant_id, pair.clone());

        if let Some(entry) = self.cache.get(&key) {
            if entry.is_valid(self.ttl) {
                debug!(%tenant_id, pair = %pair, "Rate served from cache");
                return Ok(entry.rate.clone());
            }
        }

        debug!(%tenant_id, pair = %pair, "Rate not cached, asking provider");
        let rate = self.inner.current_rate(tenant_id, pair).await?;
        self.cache.insert(
            key,
            CacheEntry {
                rate: rate.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FxError;
    use crate::provider::StaticRateProvider;
    use rust_decimal_macros::dec;
    use sarafi_common::Currency;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        inner: StaticRateProvider,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn current_rate(
            &self,
            tenant_id: TenantId,
            pair: &CurrencyPair,
        ) -> FxResult<ExchangeRate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.current_rate(tenant_id, pair).await
        }
    }

    fn setup() -> (Arc<CountingProvider>, TenantId, CurrencyPair) {
        let tenant = TenantId::new();
        let pair = CurrencyPair::new(Currency::cad(), Currency::irr());
        let inner = StaticRateProvider::new("manual");
        inner.set_rate(tenant, ExchangeRate::new(pair.clone(), dec!(52000), "desk"));
        let counting = Arc::new(CountingProvider {
            inner,
            calls: AtomicUsize::new(0),
        });
        (counting, tenant, pair)
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let (counting, tenant, pair) = setup();
        let cached = CachedRateProvider::new(counting.clone(), Duration::minutes(1));

        let first = cached.current_rate(tenant, &pair).await.unwrap();
        let second = cached.current_rate(tenant, &pair).await.unwrap();

        assert_eq!(first.rate, second.rate);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let (counting, tenant, pair) = setup();
        let cached = CachedRateProvider::new(counting.clone(), Duration::zero());

        cached.current_rate(tenant, &pair).await.unwrap();
        cached.current_rate(tenant, &pair).await.unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
        cached.evict_expired();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let (counting, _, pair) = setup();
        let cached = CachedRateProvider::new(counting.clone(), Duration::minutes(1));
        let unknown = TenantId::new();

        let result = cached.current_rate(unknown, &pair).await;
        assert!(matches!(result, Err(FxError::RateNotAvailable(_))));
        assert!(cached.is_empty());
    }
}
