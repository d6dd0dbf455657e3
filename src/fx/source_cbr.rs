use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::store::versioned_map::VersionedMap;

use super::forward_fill::compute_patch;
use super::{date_key_iso, FxSource, Schedule};

const CBR_DYNAMIC_URL: &str = "https://www.cbr.ru/scripts/XML_dynamic.asp";
const USD_VAL_NM_RQ: &str = "R01235";

fn default_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ValCurs")]
struct ValCurs {
    #[serde(rename = "Record", default)]
    records: Vec<CbrRecord>,
}

#[derive(Debug, Deserialize)]
struct CbrRecord {
    #[serde(rename = "@Date")]
    date: String,
    #[serde(rename = "VunitRate")]
    vunit_rate: String,
}

/// CBR (RUB) FX source. Ranges come back covering only business days;
/// weekends/holidays are forward-filled (spec.md §6 "FX source
/// protocols").
pub struct CbrSource {
    http: reqwest::Client,
    store: VersionedMap<String, Decimal>,
    schedule: Schedule,
    last_date: Mutex<Option<NaiveDate>>,
}

impl CbrSource {
    pub fn new(http_timeout: Duration, schedule: Schedule) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build cbr http client: {e}")))?;

        Ok(Self {
            http,
            store: VersionedMap::new(),
            schedule,
            last_date: Mutex::new(None),
        })
    }
}

#[async_trait]
impl FxSource for CbrSource {
    fn currency(&self) -> &str {
        "RUB"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    fn get(&self, day: DateTime<Utc>) -> Option<Decimal> {
        let local_day = day.with_timezone(&self.schedule.tz).date_naive();
        self.store.get(&date_key_iso(local_day))
    }

    async fn update(&self) -> AppResult<()> {
        let loc = self.schedule.tz;
        let now_local = Utc::now().with_timezone(&loc).date_naive();

        let last_saved = *self.last_date.lock().await;
        let base = last_saved.unwrap_or_else(default_from);
        let from = base.succ_opt().expect("date arithmetic in range");
        let to = now_local;

        if from > to {
            return Ok(());
        }

        let url = format!(
            "{CBR_DYNAMIC_URL}?date_req1={}&date_req2={}&VAL_NM_RQ={USD_VAL_NM_RQ}",
            from.format("%d/%m/%Y"),
            to.format("%d/%m/%Y"),
        );

        let body = match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(b) => b,
                Err(err) => {
                    tracing::warn!(%err, "cbr: failed to read response body");
                    return Ok(());
                }
            },
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "cbr: non-2xx response");
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(%err, "cbr: request failed");
                return Ok(());
            }
        };

        let doc: ValCurs = match quick_xml::de::from_str(&body) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(%err, "cbr: xml decode failed");
                return Ok(());
            }
        };

        if doc.records.is_empty() {
            return Ok(());
        }

        let mut raw = BTreeMap::new();
        for rec in &doc.records {
            if let Some((date, rate)) = parse_cbr_record(&rec.date, &rec.vunit_rate) {
                raw.insert(date, rate);
            }
        }

        let carry_seed = last_saved.and_then(|d| self.store.get(&date_key_iso(d)));
        let (patch, new_last_date) = compute_patch(&raw, from, to, carry_seed);

        if patch.is_empty() {
            return Ok(());
        }

        let patch: HashMap<String, Decimal> = patch
            .into_iter()
            .map(|(d, rate)| (date_key_iso(d), rate))
            .collect();
        self.store.upsert_many(patch);

        if let Some(new_last_date) = new_last_date {
            *self.last_date.lock().await = Some(new_last_date);
        }

        Ok(())
    }
}

/// Parses one CBR `<Record>`. CBR uses a comma decimal separator and
/// sometimes omits or mangles fields; any such record is discarded rather
/// than failing the whole update (spec.md §4.3 step 3).
fn parse_cbr_record(date: &str, vunit_rate: &str) -> Option<(NaiveDate, Decimal)> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%d.%m.%Y").ok()?;

    let raw = vunit_rate.trim().replace(',', ".");
    if raw.is_empty() {
        return None;
    }
    let rate: Decimal = raw.parse().ok()?;
    if rate.is_zero() {
        return None;
    }

    Some((date, rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- record parsing --

    #[test]
    fn parses_comma_decimal_rate() {
        let (date, rate) = parse_cbr_record("20.01.2026", "77,7586").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 20).unwrap());
        assert_eq!(rate, dec!(77.7586));
    }

    #[test]
    fn rejects_empty_date() {
        assert!(parse_cbr_record("", "77,7586").is_none());
    }

    #[test]
    fn rejects_unparseable_rate() {
        assert!(parse_cbr_record("20.01.2026", "not-a-number").is_none());
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(parse_cbr_record("20.01.2026", "0").is_none());
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(parse_cbr_record("2026-01-20", "77,7586").is_none());
    }
}
