use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{GranularitySeconds, HistoricalPrice, PriceKey};
use crate::redis::RedisPool;
use crate::store::historical_price_store::HistoricalPriceStore;

/// Historical prices are immutable once a bucket is written, except for the
/// rare granularity-upgrade rewrite (spec.md §4.6 step 7); this TTL just
/// bounds how long a cache entry can outlive such a rewrite.
const CACHE_TTL_SECS: u64 = 21_600;

#[derive(Serialize, Deserialize)]
struct CachedRow {
    price_usd: Decimal,
    granularity_seconds: i32,
}

fn cache_key(coin_id: &str, bucket_start_utc: DateTime<Utc>) -> String {
    format!("hp:{coin_id}:{}", bucket_start_utc.timestamp())
}

/// Read-through cache in front of any `HistoricalPriceStore` (spec.md §1,
/// "connection-pool plumbing to the ... cache stores"). Only present rows
/// are cached; absent sentinels always fall through, so a row written by a
/// concurrent fetch becomes visible on the next read without waiting on a
/// TTL. Cache errors are logged and never fail the request — the store
/// behaves exactly like its inner store with Redis unreachable.
pub struct CachedHistoricalPriceStore {
    inner: Arc<dyn HistoricalPriceStore>,
    redis: RedisPool,
}

impl CachedHistoricalPriceStore {
    pub fn new(inner: Arc<dyn HistoricalPriceStore>, redis: RedisPool) -> Self {
        Self { inner, redis }
    }

    async fn cache_get_many(&self, keys: &[PriceKey]) -> Vec<Option<HistoricalPrice>> {
        let cache_keys: Vec<String> = keys
            .iter()
            .map(|k| cache_key(&k.coin_id, k.bucket_start_utc))
            .collect();

        let mut conn = self.redis.clone();
        let raw: Vec<Option<String>> = conn.mget(&cache_keys).await.unwrap_or_else(|err| {
            tracing::warn!(%err, "redis mget failed, bypassing cache");
            vec![None; cache_keys.len()]
        });

        raw.into_iter()
            .zip(keys)
            .map(|(entry, key)| {
                let row: CachedRow = serde_json::from_str(entry.as_deref()?).ok()?;
                Some(HistoricalPrice::present(
                    key.coin_id.clone(),
                    key.bucket_start_utc,
                    row.price_usd,
                    GranularitySeconds(row.granularity_seconds),
                ))
            })
            .collect()
    }

    async fn cache_put_many(&self, prices: &[HistoricalPrice]) {
        let mut conn = self.redis.clone();
        for price in prices {
            let (Some(price_usd), Some(granularity_seconds)) = (price.price_usd, price.granularity_seconds) else {
                continue;
            };
            let row = CachedRow {
                price_usd,
                granularity_seconds: granularity_seconds.0,
            };
            let Ok(json) = serde_json::to_string(&row) else {
                continue;
            };
            let key = cache_key(&price.coin_id, price.bucket_start_utc);
            if let Err(err) = conn.set_ex::<_, _, ()>(&key, json, CACHE_TTL_SECS).await {
                tracing::warn!(%err, %key, "redis set_ex failed, continuing without caching this row");
            }
        }
    }
}

#[async_trait]
impl HistoricalPriceStore for CachedHistoricalPriceStore {
    async fn get(&self, coin_id: &str, bucket_start_utc: DateTime<Utc>) -> AppResult<HistoricalPrice> {
        let key = PriceKey {
            coin_id: coin_id.to_string(),
            bucket_start_utc,
        };
        let rows = self.get_batch(std::slice::from_ref(&key)).await?;
        let row = rows.into_iter().next().expect("get_batch returns one row per key");
        if row.is_absent() {
            return Err(AppError::NotFound(format!(
                "coin_id={coin_id} bucket_start_utc={bucket_start_utc}"
            )));
        }
        Ok(row)
    }

    async fn get_batch(&self, keys: &[PriceKey]) -> AppResult<Vec<HistoricalPrice>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let cached = self.cache_get_many(keys).await;

        let miss_indices: Vec<usize> = cached
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.is_none().then_some(i))
            .collect();

        if miss_indices.is_empty() {
            return Ok(cached.into_iter().map(|row| row.expect("checked above")).collect());
        }

        let miss_keys: Vec<PriceKey> = miss_indices.iter().map(|&i| keys[i].clone()).collect();
        let fetched = self.inner.get_batch(&miss_keys).await?;
        self.cache_put_many(&fetched).await;

        let mut fetched = fetched.into_iter();
        let out = cached
            .into_iter()
            .map(|row| match row {
                Some(row) => row,
                None => fetched.next().expect("one fetched row per cache miss, in order"),
            })
            .collect();

        Ok(out)
    }

    async fn upsert(&self, price: &HistoricalPrice) -> AppResult<()> {
        self.inner.upsert(price).await?;
        self.cache_put_many(std::slice::from_ref(price)).await;
        Ok(())
    }

    async fn upsert_batch(&self, prices: &[HistoricalPrice]) -> AppResult<()> {
        self.inner.upsert_batch(prices).await?;
        self.cache_put_many(prices).await;
        Ok(())
    }
}
