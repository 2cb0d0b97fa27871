//! Rate provider traits and implementations.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use sarafi_common::{CurrencyPair, TenantId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FxError, FxResult};

/// A market reference rate for a currency pair, as seen by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// The currency pair.
    pub pair: CurrencyPair,
    /// Units of `pair.quote` per one unit of `pair.base`.
    pub rate: Decimal,
    /// When this rate was quoted.
    pub quoted_at: DateTime<Utc>,
    /// Rate source.
    pub source: String,
}

impl ExchangeRate {
    /// Create a rate quoted now.
    pub fn new(pair: CurrencyPair, rate: Decimal, source: impl Into<String>) -> Self {
        Self {
            pair,
            rate,
            quoted_at: Utc::now(),
            source: source.into(),
        }
    }

    /// A rate is usable only when strictly positive.
    pub fn is_positive(&self) -> bool {
        self.rate > Decimal::ZERO
    }

    /// Check if the rate is younger than `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        Utc::now().signed_duration_since(self.quoted_at) <= max_age
    }
}

/// Looks up the current market rate for a tenant.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the current rate for a currency pair.
    async fn current_rate(&self, tenant_id: TenantId, pair: &CurrencyPair) -> FxResult<ExchangeRate>;
}

/// In-memory rate table, maintained by hand or seeded in tests.
pub struct StaticRateProvider {
    name: String,
    rates: DashMap<(TenantId, CurrencyPair), ExchangeRate>,
    max_age: Option<Duration>,
}

impl StaticRateProvider {
    /// Create an empty provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: DashMap::new(),
            max_age: None,
        }
    }

    /// Reject rates older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Set the rate for a tenant, replacing any previous rate for the pair.
    pub fn set_rate(&self, tenant_id: TenantId, rate: ExchangeRate) {
        self.rates.insert((tenant_id, rate.pair.clone()), rate);
    }

    /// Remove the rate for a pair.
    pub fn remove_rate(&self, tenant_id: TenantId, pair: &CurrencyPair) {
        self.rates.remove(&(tenant_id, pair.clone()));
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn current_rate(&self, tenant_id: TenantId, pair: &CurrencyPair) -> FxResult<ExchangeRate> {
        let rate = self
            .rates
            .get(&(tenant_id, pair.clone()))
            .map(|entry| entry.clone())
            .ok_or_else(|| FxError::RateNotAvailable(pair.clone()))?;

        if let Some(max_age) = self.max_age {
            if !rate.is_fresh(max_age) {
                return Err(FxError::RateStale(pair.clone()));
            }
        }

        debug!(provider = %self.name, pair = %pair, rate = %rate.rate, "Rate served");
        Ok(rate)
    }
}
