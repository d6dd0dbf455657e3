pub mod forward_fill;
pub mod provider;
pub mod registry;
pub mod source_cbr;
pub mod source_kzt;
pub mod source_usd;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

pub use provider::{FiatRateSource, FxProvider};
pub use registry::FxRegistry;
pub use source_cbr::CbrSource;
pub use source_kzt::KztSource;
pub use source_usd::UsdIdentitySource;

use crate::error::AppResult;

/// Fire time for a source's scheduled update, in the source's home zone
/// (spec.md §4.3 "schedule").
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub tz: chrono_tz::Tz,
    pub hour: u32,
    pub minute: u32,
}

/// A polymorphic FX data source: one per fiat currency (spec.md §4.3,
/// §9 "Polymorphic FX sources"). `get`/`update` form the whole surface the
/// registry and provider facade need.
#[async_trait]
pub trait FxSource: Send + Sync {
    fn currency(&self) -> &str;

    fn schedule(&self) -> Schedule;

    /// Looks up the rate for `day` (any instant; normalized to the
    /// source's locale date internally).
    fn get(&self, day: DateTime<Utc>) -> Option<Decimal>;

    /// Runs one poll cycle: fetch, parse, forward-fill, persist. Never
    /// fails the caller — errors are logged and retried on the next tick
    /// (spec.md §4.3 "on update failure, last_date is unchanged").
    async fn update(&self) -> AppResult<()>;
}

/// `YYYY-MM-DD`, the stable, sortable key every source's store uses
/// regardless of the source protocol's native date format.
pub fn date_key_iso(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Computes the next wall-clock fire time for `schedule`, in the source's
/// zone: today's target time if still in the future, else tomorrow's
/// (spec.md §4.4 `run_loop`).
pub fn next_run_time(now: DateTime<Utc>, schedule: Schedule) -> DateTime<Utc> {
    use chrono::TimeZone;

    let local_now = now.with_timezone(&schedule.tz);
    let today = local_now.date_naive();

    let run_today = schedule
        .tz
        .from_local_datetime(
            &today
                .and_hms_opt(schedule.hour, schedule.minute, 0)
                .expect("valid schedule time"),
        )
        .single()
        .expect("unambiguous local time");

    let run = if run_today > local_now {
        run_today
    } else {
        let tomorrow = today.succ_opt().expect("date arithmetic in range");
        schedule
            .tz
            .from_local_datetime(
                &tomorrow
                    .and_hms_opt(schedule.hour, schedule.minute, 0)
                    .expect("valid schedule time"),
            )
            .single()
            .expect("unambiguous local time")
    };

    run.with_timezone(&Utc)
}
