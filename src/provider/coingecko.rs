use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Deserialize;

use crate::config::Coingecko;
use crate::error::{AppError, AppResult};
use crate::models::GranularitySeconds;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Deserialize)]
struct MarketChartRangeResponse {
    prices: Vec<Vec<f64>>,
}

/// A single `(timestamp_ms, price)` point as returned by the provider,
/// still trusted only by its position within the day's response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp_ms: i64,
    pub price: f64,
}

/// Rate-limited HTTP client for the market-data provider (spec.md §4.2).
/// Owns a token-bucket limiter sized to `rate_limit_per_minute` with burst
/// equal to the per-minute budget, mirroring the teacher's `governor`
/// usage in `av-client`.
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: Arc<Limiter>,
    granularity_policy: GranularityPolicyThresholds,
}

#[derive(Debug, Clone, Copy)]
pub struct GranularityPolicyThresholds {
    pub five_minutes: chrono::Duration,
    pub one_hour: chrono::Duration,
}

impl CoinGeckoClient {
    pub fn new(config: &Coingecko) -> AppResult<Self> {
        let per_minute = NonZeroU32::new(config.rate_limit_per_min.max(1))
            .ok_or_else(|| AppError::Internal("rate_limit_per_min must be > 0".to_string()))?;
        let quota = Quota::per_minute(per_minute);
        let limiter = Arc::new(RateLimiter::direct(quota));

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            limiter,
            granularity_policy: GranularityPolicyThresholds {
                five_minutes: chrono::Duration::seconds(config.granularity_policy.five_minutes_secs as i64),
                one_hour: chrono::Duration::seconds(config.granularity_policy.one_hour_secs as i64),
            },
        })
    }

    /// Classifies `age = now - tx_time` into one of the three supported
    /// granularities using the configured thresholds (spec.md §4.2).
    pub fn granularity_seconds(&self, tx_time: DateTime<Utc>, now: DateTime<Utc>) -> GranularitySeconds {
        let age = now - tx_time;
        if age < self.granularity_policy.five_minutes {
            GranularitySeconds::FIVE_MINUTES
        } else if age < self.granularity_policy.one_hour {
            GranularitySeconds::ONE_HOUR
        } else {
            GranularitySeconds::ONE_DAY
        }
    }

    /// `coins_market_chart_range` — fetches an ordered price series for
    /// `[from, to]` in USD. Blocks on the rate limiter before issuing the
    /// request.
    pub async fn coins_market_chart_range(
        &self,
        coin_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        precision: &str,
    ) -> AppResult<Vec<PricePoint>> {
        self.limiter.until_ready().await;

        let url = format!(
            "{}/coins/{}/market_chart/range",
            self.base_url,
            urlencoding_path_segment(coin_id)
        );

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("x-cg-demo-api-key", &self.api_key)
            .query(&[
                ("vs_currency", "usd"),
                ("from", &from.timestamp().to_string()),
                ("to", &to.timestamp().to_string()),
                ("precision", precision),
            ])
            .send()
            .await
            .map_err(|err| AppError::ProviderUnavailable(err.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| AppError::ProviderUnavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(AppError::ProviderBadResponse(format!(
                "coingecko http {status}: {body}"
            )));
        }

        let parsed: MarketChartRangeResponse = serde_json::from_str(&body)
            .map_err(|err| AppError::ProviderBadResponse(format!("json decode: {err}; body={body}")))?;

        if parsed.prices.is_empty() {
            return Err(AppError::ProviderBadResponse(format!(
                "empty prices for coin={coin_id} day={}",
                from.date_naive()
            )));
        }

        let mut out = Vec::with_capacity(parsed.prices.len());
        for (idx, pt) in parsed.prices.iter().enumerate() {
            if pt.len() < 2 {
                return Err(AppError::ProviderBadResponse(format!("bad point at idx={idx}")));
            }
            out.push(PricePoint {
                timestamp_ms: pt[0] as i64,
                price: pt[1],
            });
        }

        Ok(out)
    }
}

fn urlencoding_path_segment(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
