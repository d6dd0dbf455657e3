use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{GranularitySeconds, HistoricalPrice, PriceKey};

/// Persistence boundary for historical price buckets. `get_batch` and
/// `upsert_batch` are the two operations the pricing use case actually
/// drives; `get`/`upsert` exist for completeness and for callers that only
/// need a single row (spec.md §4.1-4.2).
#[async_trait]
pub trait HistoricalPriceStore: Send + Sync {
    async fn get(&self, coin_id: &str, bucket_start_utc: DateTime<Utc>) -> AppResult<HistoricalPrice>;

    /// Returns exactly `keys.len()` rows, in the same order as `keys`, with
    /// an absent sentinel (spec.md §4.1) standing in for any key with no
    /// row. Callers rely on this invariant and must never need to
    /// re-correlate results by key.
    async fn get_batch(&self, keys: &[PriceKey]) -> AppResult<Vec<HistoricalPrice>>;

    async fn upsert(&self, price: &HistoricalPrice) -> AppResult<()>;

    /// Upserts every row in a single statement. Idempotent: re-running the
    /// same batch is always safe, which is what lets the pricing use case
    /// skip single-flight/dedup of concurrent provider fetches for the
    /// same day (spec.md §4.3).
    async fn upsert_batch(&self, prices: &[HistoricalPrice]) -> AppResult<()>;
}

pub struct PgHistoricalPriceStore {
    pool: PgPool,
}

impl PgHistoricalPriceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoricalPriceStore for PgHistoricalPriceStore {
    async fn get(&self, coin_id: &str, bucket_start_utc: DateTime<Utc>) -> AppResult<HistoricalPrice> {
        let row = sqlx::query!(
            r#"
            SELECT price_usd, granularity_seconds
            FROM historical_prices
            WHERE coin_id = $1 AND bucket_start_utc = $2
            "#,
            coin_id,
            bucket_start_utc,
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(HistoricalPrice {
                coin_id: coin_id.to_string(),
                bucket_start_utc,
                price_usd: r.price_usd,
                granularity_seconds: r.granularity_seconds.map(GranularitySeconds),
            }),
            None => Err(AppError::NotFound(format!(
                "coin_id={coin_id} bucket_start_utc={bucket_start_utc}"
            ))),
        }
    }

    async fn get_batch(&self, keys: &[PriceKey]) -> AppResult<Vec<HistoricalPrice>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let coin_ids: Vec<&str> = keys.iter().map(|k| k.coin_id.as_str()).collect();
        let bucket_starts: Vec<DateTime<Utc>> = keys.iter().map(|k| k.bucket_start_utc).collect();

        let rows = sqlx::query!(
            r#"
            SELECT
                want.coin_id AS "coin_id!",
                want.bucket_start_utc AS "bucket_start_utc!",
                hp.price_usd,
                hp.granularity_seconds
            FROM UNNEST($1::text[], $2::timestamptz[])
                WITH ORDINALITY AS want(coin_id, bucket_start_utc, ord)
            LEFT JOIN historical_prices hp
                ON hp.coin_id = want.coin_id AND hp.bucket_start_utc = want.bucket_start_utc
            ORDER BY want.ord
            "#,
            &coin_ids as &[&str],
            &bucket_starts,
        )
        .fetch_all(&self.pool)
        .await?;

        let out = rows
            .into_iter()
            .map(|r| HistoricalPrice {
                coin_id: r.coin_id,
                bucket_start_utc: r.bucket_start_utc,
                price_usd: r.price_usd,
                granularity_seconds: r.granularity_seconds.map(GranularitySeconds),
            })
            .collect::<Vec<_>>();

        if out.len() != keys.len() {
            return Err(AppError::Internal(format!(
                "pricing invariant violated: got {} rows for {} keys",
                out.len(),
                keys.len()
            )));
        }

        Ok(out)
    }

    async fn upsert(&self, price: &HistoricalPrice) -> AppResult<()> {
        let price_usd: Decimal = price.price_usd.ok_or_else(|| {
            AppError::InvalidArgument("upsert requires a present price_usd".to_string())
        })?;
        let granularity = price
            .granularity_seconds
            .ok_or_else(|| AppError::InvalidArgument("upsert requires a granularity_seconds".to_string()))?;

        sqlx::query!(
            r#"
            INSERT INTO historical_prices (coin_id, bucket_start_utc, price_usd, granularity_seconds)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (coin_id, bucket_start_utc)
            DO UPDATE SET price_usd = EXCLUDED.price_usd, granularity_seconds = EXCLUDED.granularity_seconds
            "#,
            price.coin_id,
            price.bucket_start_utc,
            price_usd,
            granularity.0,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_batch(&self, prices: &[HistoricalPrice]) -> AppResult<()> {
        if prices.is_empty() {
            return Ok(());
        }

        let mut coin_ids = Vec::with_capacity(prices.len());
        let mut bucket_starts = Vec::with_capacity(prices.len());
        let mut price_usds = Vec::with_capacity(prices.len());
        let mut granularities = Vec::with_capacity(prices.len());

        for p in prices {
            let price_usd = p.price_usd.ok_or_else(|| {
                AppError::InvalidArgument("upsert_batch requires a present price_usd".to_string())
            })?;
            let granularity = p.granularity_seconds.ok_or_else(|| {
                AppError::InvalidArgument("upsert_batch requires a granularity_seconds".to_string())
            })?;

            coin_ids.push(p.coin_id.as_str());
            bucket_starts.push(p.bucket_start_utc);
            price_usds.push(price_usd);
            granularities.push(granularity.0);
        }

        sqlx::query!(
            r#"
            INSERT INTO historical_prices (coin_id, bucket_start_utc, price_usd, granularity_seconds)
            SELECT * FROM UNNEST($1::text[], $2::timestamptz[], $3::numeric[], $4::int4[])
            ON CONFLICT (coin_id, bucket_start_utc)
            DO UPDATE SET price_usd = EXCLUDED.price_usd, granularity_seconds = EXCLUDED.granularity_seconds
            "#,
            &coin_ids as &[&str],
            &bucket_starts,
            &price_usds,
            &granularities,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
