//! Rate lookup backed by the `exchange_rates` table.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sarafi_common::{CurrencyPair, TenantId};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::{FxError, FxResult};
use crate::provider::{ExchangeRate, RateProvider};

/// Reads the newest rate a tenant recorded for a pair.
pub struct PgRateProvider {
    pool: PgPool,
    max_age: Option<Duration>,
}

impl PgRateProvider {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_age: None,
        }
    }

    /// Ignore rates quoted earlier than `max_age` ago.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

#[async_trait]
impl RateProvider for PgRateProvider {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn current_rate(&self, tenant_id: TenantId, pair: &CurrencyPair) -> FxResult<ExchangeRate> {
        let row = sqlx::query(
            r#"
            SELECT rate, quoted_at, source
            FROM exchange_rates
            WHERE tenant_id = $1 AND from_currency = $2 AND to_currency = $3
            ORDER BY quoted_at DESC
            LIMIT 1
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(pair.base.code())
        .bind(pair.quote.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FxError::ProviderError(e.to_string()))?
        .ok_or_else(|| FxError::RateNotAvailable(pair.clone()))?;

        let rate = ExchangeRate {
            pair: pair.clone(),
            rate: row
                .try_get::<Decimal, _>("rate")
                .map_err(|e| FxError::ProviderError(e.to_string()))?,
            quoted_at: row
                .try_get::<DateTime<Utc>, _>("quoted_at")
                .map_err(|e| FxError::ProviderError(e.to_string()))?,
            source: row
                .try_get::<String, _>("source")
                .map_err(|e| FxError::ProviderError(e.to_string()))?,
        };

        if let Some(max_age) = self.max_age {
            if !rate.is_fresh(max_age) {
                return Err(FxError::RateStale(pair.clone()));
            }
        }

        debug!(pair = %pair, rate = %rate.rate, "Rate loaded from database");
        Ok(rate)
    }
}
