use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::AppResult;

use super::{FxSource, Schedule};

/// Identity FX source for the USD leg (SPEC_FULL.md §C.2, Open Question
/// 2): `get` always returns `1` and `update` is a no-op, so the pricing
/// use case can call `get_usd_to_fiat_rate` uniformly for every currency
/// including USD itself.
pub struct UsdIdentitySource;

#[async_trait]
impl FxSource for UsdIdentitySource {
    fn currency(&self) -> &str {
        "USD"
    }

    fn schedule(&self) -> Schedule {
        Schedule {
            tz: chrono_tz::UTC,
            hour: 0,
            minute: 0,
        }
    }

    fn get(&self, _day: DateTime<Utc>) -> Option<Decimal> {
        Some(dec!(1))
    }

    async fn update(&self) -> AppResult<()> {
        Ok(())
    }
}
