pub mod coingecko;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use coingecko::{CoinGeckoClient, PricePoint};

use crate::error::AppResult;
use crate::models::GranularitySeconds;

/// The market-data boundary the pricing use case actually drives —
/// granularity classification and a single day's price series. Letting
/// the use case hold `Arc<dyn MarketDataProvider>` rather than the
/// concrete client keeps its order/length/upgrade invariants testable
/// without a live HTTP dependency (SPEC_FULL.md §A.7).
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn granularity_seconds(&self, tx_time: DateTime<Utc>, now: DateTime<Utc>) -> GranularitySeconds;

    async fn coins_market_chart_range(
        &self,
        coin_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        precision: &str,
    ) -> AppResult<Vec<PricePoint>>;
}

#[async_trait]
impl MarketDataProvider for CoinGeckoClient {
    fn granularity_seconds(&self, tx_time: DateTime<Utc>, now: DateTime<Utc>) -> GranularitySeconds {
        CoinGeckoClient::granularity_seconds(self, tx_time, now)
    }

    async fn coins_market_chart_range(
        &self,
        coin_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        precision: &str,
    ) -> AppResult<Vec<PricePoint>> {
        CoinGeckoClient::coins_market_chart_range(self, coin_id, from, to, precision).await
    }
}
