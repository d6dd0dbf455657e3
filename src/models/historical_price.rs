use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One of the three bucket widths the pricing use case ever requests or
/// persists (spec.md §3 "Historical price").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GranularitySeconds(pub i32);

impl GranularitySeconds {
    pub const FIVE_MINUTES: GranularitySeconds = GranularitySeconds(300);
    pub const ONE_HOUR: GranularitySeconds = GranularitySeconds(3600);
    pub const ONE_DAY: GranularitySeconds = GranularitySeconds(86400);

    pub fn seconds(self) -> i64 {
        self.0 as i64
    }
}

/// Identifies a persisted (or requested) historical-price row: a coin on a
/// specific aligned UTC bucket (spec.md §3, "Price key / request
/// fingerprint").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub coin_id: String,
    pub bucket_start_utc: DateTime<Utc>,
}

/// A stored (or absent) historical price row. `price_usd` /
/// `granularity_seconds` are both `None` for the "absent" sentinel that
/// `get_batch` must return for missing keys (spec.md §4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalPrice {
    pub coin_id: String,
    pub bucket_start_utc: DateTime<Utc>,
    pub price_usd: Option<Decimal>,
    pub granularity_seconds: Option<GranularitySeconds>,
}

impl HistoricalPrice {
    pub fn absent(coin_id: impl Into<String>, bucket_start_utc: DateTime<Utc>) -> Self {
        Self {
            coin_id: coin_id.into(),
            bucket_start_utc,
            price_usd: None,
            granularity_seconds: None,
        }
    }

    pub fn present(
        coin_id: impl Into<String>,
        bucket_start_utc: DateTime<Utc>,
        price_usd: Decimal,
        granularity_seconds: GranularitySeconds,
    ) -> Self {
        Self {
            coin_id: coin_id.into(),
            bucket_start_utc,
            price_usd: Some(price_usd),
            granularity_seconds: Some(granularity_seconds),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.price_usd.is_none()
    }
}

/// Floors `t` to the nearest multiple of `granularity` seconds since the
/// UTC epoch (spec.md §3 invariant, §8 property 2).
pub fn floor_to_bucket(t: DateTime<Utc>, granularity: GranularitySeconds) -> DateTime<Utc> {
    let g = granularity.seconds();
    let secs = t.timestamp();
    let floored = secs.div_euclid(g) * g;
    DateTime::from_timestamp(floored, 0).expect("floored timestamp in range")
}

/// Truncates `t` to 00:00:00 UTC of its calendar day.
pub fn truncate_to_day_utc(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn floor_aligns_to_five_minutes() {
        let t = dt(2024, 6, 10, 12, 34, 56);
        let bucket = floor_to_bucket(t, GranularitySeconds::FIVE_MINUTES);
        assert_eq!(bucket, dt(2024, 6, 10, 12, 30, 0));
    }

    #[test]
    fn floor_aligns_to_hour() {
        let t = dt(2024, 6, 10, 12, 34, 56);
        let bucket = floor_to_bucket(t, GranularitySeconds::ONE_HOUR);
        assert_eq!(bucket, dt(2024, 6, 10, 12, 0, 0));
    }

    #[test]
    fn floor_aligns_to_day() {
        let t = dt(2024, 6, 10, 12, 34, 56);
        let bucket = floor_to_bucket(t, GranularitySeconds::ONE_DAY);
        assert_eq!(bucket, dt(2024, 6, 10, 0, 0, 0));
    }

    #[test]
    fn floor_result_is_epoch_aligned_mod_granularity() {
        for g in [
            GranularitySeconds::FIVE_MINUTES,
            GranularitySeconds::ONE_HOUR,
            GranularitySeconds::ONE_DAY,
        ] {
            let t = dt(2024, 1, 7, 23, 59, 59);
            let bucket = floor_to_bucket(t, g);
            assert_eq!(bucket.timestamp().rem_euclid(g.seconds()), 0);
        }
    }

    #[test]
    fn day_truncation_drops_time_of_day() {
        let t = dt(2024, 6, 10, 23, 59, 59);
        assert_eq!(truncate_to_day_utc(t), dt(2024, 6, 10, 0, 0, 0));
    }
}
