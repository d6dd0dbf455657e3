use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::fx::FiatRateSource;
use crate::models::{floor_to_bucket, truncate_to_day_utc, GranularitySeconds, HistoricalPrice, PriceKey};
use crate::provider::MarketDataProvider;
use crate::store::HistoricalPriceStore;

/// One input to `get_historical_prices`: a coin observed at a point in
/// time (spec.md §4.6 calls this a "price key", distinct from the
/// store-level `(coin_id, bucket_start_utc)` fingerprint).
#[derive(Debug, Clone)]
pub struct PricingKey {
    pub coin_id: String,
    pub tx_time_utc: DateTime<Utc>,
}

/// The per-request orchestrator: fingerprint, plan, fetch-on-miss,
/// re-read, convert (spec.md §4.6 — "the heart of the system").
pub struct HistoricalPriceUseCase {
    store: Arc<dyn HistoricalPriceStore>,
    fx: Arc<dyn FiatRateSource>,
    provider: Arc<dyn MarketDataProvider>,
    request_timeout: Option<Duration>,
    strict_point_count: bool,
}

struct Wanted {
    coin_id: String,
    bucket: DateTime<Utc>,
    day_start: DateTime<Utc>,
    desired_granularity: GranularitySeconds,
}

#[derive(Hash, Eq, PartialEq, Clone)]
struct FetchTuple {
    coin_id: String,
    day_start: DateTime<Utc>,
    granularity: GranularitySeconds,
}

impl HistoricalPriceUseCase {
    pub fn new(
        store: Arc<dyn HistoricalPriceStore>,
        fx: Arc<dyn FiatRateSource>,
        provider: Arc<dyn MarketDataProvider>,
        request_timeout: Option<Duration>,
        strict_point_count: bool,
    ) -> Self {
        Self {
            store,
            fx,
            provider,
            request_timeout,
            strict_point_count,
        }
    }

    pub async fn get_historical_prices(&self, fiat: &str, price_keys: &[PricingKey]) -> AppResult<Vec<Decimal>> {
        if fiat.is_empty() {
            return Err(AppError::InvalidArgument("fiat currency is required".to_string()));
        }
        if price_keys.is_empty() {
            return Ok(Vec::new());
        }

        let run = self.run(fiat, price_keys);
        match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => Err(AppError::DeadlineExceeded),
            },
            None => run.await,
        }
    }

    async fn run(&self, fiat: &str, price_keys: &[PricingKey]) -> AppResult<Vec<Decimal>> {
        let now = Utc::now();

        let mut wanted = Vec::with_capacity(price_keys.len());
        let mut repo_keys = Vec::with_capacity(price_keys.len());

        for key in price_keys {
            let desired_granularity = self.provider.granularity_seconds(key.tx_time_utc, now);
            let bucket = floor_to_bucket(key.tx_time_utc, desired_granularity);
            let day_start = truncate_to_day_utc(key.tx_time_utc);

            wanted.push(Wanted {
                coin_id: key.coin_id.clone(),
                bucket,
                day_start,
                desired_granularity,
            });
            repo_keys.push(PriceKey {
                coin_id: key.coin_id.clone(),
                bucket_start_utc: bucket,
            });
        }

        let mut rows = self.store.get_batch(&repo_keys).await?;
        if rows.len() != repo_keys.len() {
            return Err(AppError::Internal(format!(
                "pricing invariant violated: got {} rows for {} keys",
                rows.len(),
                repo_keys.len()
            )));
        }

        let mut need_fetch: HashSet<FetchTuple> = HashSet::new();
        for (w, row) in wanted.iter().zip(rows.iter()) {
            let missing = row.is_absent();
            let upgrade = !missing
                && row
                    .granularity_seconds
                    .map(|stored| stored.seconds() > w.desired_granularity.seconds())
                    .unwrap_or(false);

            if missing || upgrade {
                need_fetch.insert(FetchTuple {
                    coin_id: w.coin_id.clone(),
                    day_start: w.day_start,
                    granularity: w.desired_granularity,
                });
            }
        }

        for fetch in &need_fetch {
            self.fetch_and_upsert_day(&fetch.coin_id, fetch.day_start, fetch.granularity)
                .await?;
        }

        if !need_fetch.is_empty() {
            rows = self.store.get_batch(&repo_keys).await?;
            if rows.len() != repo_keys.len() {
                return Err(AppError::Internal(format!(
                    "pricing invariant violated after fetch: got {} rows for {} keys",
                    rows.len(),
                    repo_keys.len()
                )));
            }
        }

        let mut fx_cache: HashMap<DateTime<Utc>, Decimal> = HashMap::new();
        let mut out = Vec::with_capacity(rows.len());

        for (w, row) in wanted.iter().zip(rows.iter()) {
            let price_usd = row.price_usd.ok_or_else(|| {
                tracing::error!(coin_id = %w.coin_id, bucket = %w.bucket, "price still missing after fetch");
                AppError::PriceUnavailable {
                    coin_id: w.coin_id.clone(),
                    bucket: w.bucket.to_rfc3339(),
                }
            })?;

            let rate = match fx_cache.get(&w.day_start) {
                Some(r) => *r,
                None => {
                    let r = self.fx.get_usd_to_fiat_rate(w.day_start, fiat).await?;
                    fx_cache.insert(w.day_start, r);
                    r
                }
            };

            out.push(price_usd * rate);
        }

        Ok(out)
    }

    async fn fetch_and_upsert_day(
        &self,
        coin_id: &str,
        day_start_utc: DateTime<Utc>,
        granularity: GranularitySeconds,
    ) -> AppResult<()> {
        let to = day_start_utc + chrono::Duration::hours(24) - chrono::Duration::seconds(1);

        let points = self
            .provider
            .coins_market_chart_range(coin_id, day_start_utc, to, "3")
            .await?;

        let expected_points = (86400 / granularity.seconds()) as usize;
        if self.strict_point_count && points.len() != expected_points {
            return Err(AppError::ProviderBadResponse(format!(
                "coin={coin_id} day={}: expected {expected_points} points, got {}",
                day_start_utc.date_naive(),
                points.len()
            )));
        }

        let mut buckets = Vec::with_capacity(points.len());
        for (i, point) in points.iter().enumerate() {
            let bucket = day_start_utc + chrono::Duration::seconds(i as i64 * granularity.seconds());
            let price = Decimal::try_from(point.price)
                .map_err(|err| AppError::ProviderBadResponse(format!("non-finite price at idx={i}: {err}")))?;

            buckets.push(HistoricalPrice::present(coin_id, bucket, price, granularity));
        }

        self.store.upsert_batch(&buckets).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PricePoint;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeStore {
        rows: Mutex<StdHashMap<(String, DateTime<Utc>), HistoricalPrice>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(StdHashMap::new()),
            }
        }

        fn seed(&self, p: HistoricalPrice) {
            self.rows
                .lock()
                .unwrap()
                .insert((p.coin_id.clone(), p.bucket_start_utc), p);
        }
    }

    #[async_trait]
    impl HistoricalPriceStore for FakeStore {
        async fn get(&self, coin_id: &str, bucket_start_utc: DateTime<Utc>) -> AppResult<HistoricalPrice> {
            self.rows
                .lock()
                .unwrap()
                .get(&(coin_id.to_string(), bucket_start_utc))
                .cloned()
                .ok_or_else(|| AppError::NotFound(coin_id.to_string()))
        }

        async fn get_batch(&self, keys: &[PriceKey]) -> AppResult<Vec<HistoricalPrice>> {
            let rows = self.rows.lock().unwrap();
            Ok(keys
                .iter()
                .map(|k| {
                    rows.get(&(k.coin_id.clone(), k.bucket_start_utc))
                        .cloned()
                        .unwrap_or_else(|| HistoricalPrice::absent(&k.coin_id, k.bucket_start_utc))
                })
                .collect())
        }

        async fn upsert(&self, price: &HistoricalPrice) -> AppResult<()> {
            self.seed(price.clone());
            Ok(())
        }

        async fn upsert_batch(&self, prices: &[HistoricalPrice]) -> AppResult<()> {
            for p in prices {
                self.seed(p.clone());
            }
            Ok(())
        }
    }

    struct FakeProvider {
        granularity: GranularitySeconds,
        points_per_day: usize,
        fetch_count: AtomicUsize,
    }

    impl FakeProvider {
        fn new(granularity: GranularitySeconds, points_per_day: usize) -> Self {
            Self {
                granularity,
                points_per_day,
                fetch_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for FakeProvider {
        fn granularity_seconds(&self, _tx_time: DateTime<Utc>, _now: DateTime<Utc>) -> GranularitySeconds {
            self.granularity
        }

        async fn coins_market_chart_range(
            &self,
            _coin_id: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _precision: &str,
        ) -> AppResult<Vec<PricePoint>> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.points_per_day)
                .map(|i| PricePoint {
                    timestamp_ms: i as i64,
                    price: 100.0 + i as f64,
                })
                .collect())
        }
    }

    struct FakeFx {
        rate: Decimal,
    }

    #[async_trait]
    impl FiatRateSource for FakeFx {
        async fn get_usd_to_fiat_rate(&self, _day: DateTime<Utc>, _fiat: &str) -> AppResult<Decimal> {
            Ok(self.rate)
        }
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    // -- order & length --

    #[tokio::test]
    async fn rejects_empty_fiat() {
        let store = Arc::new(FakeStore::new());
        let provider = Arc::new(FakeProvider::new(GranularitySeconds::ONE_DAY, 1));
        let fx = Arc::new(FakeFx { rate: dec!(1) });
        let uc = HistoricalPriceUseCase::new(store, fx, provider, None, false);

        let result = uc
            .get_historical_prices("", &[PricingKey {
                coin_id: "bitcoin".to_string(),
                tx_time_utc: dt(2024, 6, 10, 12, 0, 0),
            }])
            .await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn empty_keys_yields_empty_result() {
        let store = Arc::new(FakeStore::new());
        let provider = Arc::new(FakeProvider::new(GranularitySeconds::ONE_DAY, 1));
        let fx = Arc::new(FakeFx { rate: dec!(1) });
        let uc = HistoricalPriceUseCase::new(store, fx, provider, None, false);

        let result = uc.get_historical_prices("USD", &[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn returns_same_length_and_order_as_input() {
        let store = Arc::new(FakeStore::new());
        let provider = Arc::new(FakeProvider::new(GranularitySeconds::ONE_DAY, 1));
        let fx = Arc::new(FakeFx { rate: dec!(1) });
        let uc = HistoricalPriceUseCase::new(store, fx, provider, None, false);

        let keys = vec![
            PricingKey {
                coin_id: "bitcoin".to_string(),
                tx_time_utc: dt(2024, 1, 1, 0, 0, 0),
            },
            PricingKey {
                coin_id: "ethereum".to_string(),
                tx_time_utc: dt(2024, 1, 2, 0, 0, 0),
            },
        ];
        let result = uc.get_historical_prices("USD", &keys).await.unwrap();
        assert_eq!(result.len(), keys.len());
    }

    // -- miss / upgrade --

    #[tokio::test]
    async fn fetches_provider_on_store_miss() {
        let store = Arc::new(FakeStore::new());
        let provider = Arc::new(FakeProvider::new(GranularitySeconds::ONE_DAY, 1));
        let fx = Arc::new(FakeFx { rate: dec!(1) });
        let uc = HistoricalPriceUseCase::new(store.clone(), fx, provider.clone(), None, false);

        let keys = vec![PricingKey {
            coin_id: "bitcoin".to_string(),
            tx_time_utc: dt(2024, 6, 10, 12, 0, 0),
        }];
        let result = uc.get_historical_prices("USD", &keys).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(provider.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn two_legs_same_coin_and_day_trigger_a_single_fetch() {
        let store = Arc::new(FakeStore::new());
        let provider = Arc::new(FakeProvider::new(GranularitySeconds::ONE_DAY, 1));
        let fx = Arc::new(FakeFx { rate: dec!(1) });
        let uc = HistoricalPriceUseCase::new(store, fx, provider.clone(), None, false);

        let keys = vec![
            PricingKey {
                coin_id: "bitcoin".to_string(),
                tx_time_utc: dt(2024, 6, 10, 0, 0, 0),
            },
            PricingKey {
                coin_id: "bitcoin".to_string(),
                tx_time_utc: dt(2024, 6, 10, 23, 59, 0),
            },
        ];
        let result = uc.get_historical_prices("USD", &keys).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(provider.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn coarser_stored_granularity_triggers_an_upgrade_fetch() {
        let store = Arc::new(FakeStore::new());
        let day_start = dt(2024, 6, 10, 0, 0, 0);
        store.seed(HistoricalPrice::present(
            "bitcoin",
            day_start,
            dec!(100),
            GranularitySeconds::ONE_DAY,
        ));

        let provider = Arc::new(FakeProvider::new(GranularitySeconds::FIVE_MINUTES, 288));
        let fx = Arc::new(FakeFx { rate: dec!(1) });
        let uc = HistoricalPriceUseCase::new(store, fx, provider.clone(), None, false);

        let keys = vec![PricingKey {
            coin_id: "bitcoin".to_string(),
            tx_time_utc: dt(2024, 6, 10, 12, 34, 56),
        }];
        let result = uc.get_historical_prices("USD", &keys).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(provider.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn price_still_absent_after_fetch_surfaces_price_unavailable() {
        let store = Arc::new(FakeStore::new());
        // A provider returning zero points means fetch_and_upsert_day writes
        // nothing; the re-read after the fetch still finds an absent row.
        let provider = Arc::new(FakeProvider::new(GranularitySeconds::ONE_DAY, 0));
        let fx = Arc::new(FakeFx { rate: dec!(1) });
        let uc = HistoricalPriceUseCase::new(store, fx, provider, None, false);

        let keys = vec![PricingKey {
            coin_id: "bitcoin".to_string(),
            tx_time_utc: dt(2024, 6, 10, 12, 0, 0),
        }];
        let result = uc.get_historical_prices("USD", &keys).await;
        assert!(matches!(result, Err(AppError::PriceUnavailable { .. })));
    }

    // -- fiat conversion --

    #[tokio::test]
    async fn applies_fx_rate_to_usd_price() {
        let store = Arc::new(FakeStore::new());
        let day_start = dt(2024, 6, 10, 0, 0, 0);
        store.seed(HistoricalPrice::present(
            "bitcoin",
            day_start,
            dec!(100),
            GranularitySeconds::ONE_DAY,
        ));

        let provider = Arc::new(FakeProvider::new(GranularitySeconds::ONE_DAY, 1));
        let fx = Arc::new(FakeFx { rate: dec!(90.1234) });
        let uc = HistoricalPriceUseCase::new(store, fx, provider, None, false);

        let keys = vec![PricingKey {
            coin_id: "bitcoin".to_string(),
            tx_time_utc: dt(2024, 6, 10, 12, 0, 0),
        }];
        let result = uc.get_historical_prices("RUB", &keys).await.unwrap();
        assert_eq!(result[0], dec!(9012.34));
    }
}
