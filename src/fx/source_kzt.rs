use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::store::versioned_map::VersionedMap;

use super::forward_fill::compute_patch;
use super::{date_key_iso, FxSource, Schedule};

const NBRK_GET_RATES_URL: &str = "https://nationalbank.kz/rss/get_rates.cfm";

fn default_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

#[derive(Debug, Deserialize)]
struct NbrkRates {
    #[serde(rename = "item", default)]
    items: Vec<NbrkItem>,
}

#[derive(Debug, Deserialize)]
struct NbrkItem {
    title: String,
    description: String,
}

/// NBRK (KZT) FX source. Unlike CBR, it exposes no range endpoint: every
/// day in the gap is queried individually (spec.md §6 "FX source
/// protocols").
pub struct KztSource {
    http: reqwest::Client,
    store: VersionedMap<String, Decimal>,
    schedule: Schedule,
    last_date: Mutex<Option<NaiveDate>>,
}

impl KztSource {
    pub fn new(http_timeout: Duration, schedule: Schedule) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build nbrk http client: {e}")))?;

        Ok(Self {
            http,
            store: VersionedMap::new(),
            schedule,
            last_date: Mutex::new(None),
        })
    }

    async fn fetch_day(&self, day: NaiveDate) -> Option<Decimal> {
        let url = format!("{NBRK_GET_RATES_URL}?fdate={}", day.format("%d.%m.%Y"));

        let body = match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok()?,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), %day, "nbrk: non-2xx response");
                return None;
            }
            Err(err) => {
                tracing::warn!(%err, %day, "nbrk: request failed");
                return None;
            }
        };

        let doc: NbrkRates = match quick_xml::de::from_str(&body) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(%err, %day, "nbrk: xml decode failed");
                return None;
            }
        };

        parse_nbrk_usd(&doc)
    }
}

#[async_trait]
impl FxSource for KztSource {
    fn currency(&self) -> &str {
        "KZT"
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
        let to = now_local.succ_opt().expect("date arithmetic in range");

        if from > to {
            return Ok(());
        }

        let mut raw = BTreeMap::new();
        let mut d = from;
        while d <= to {
            if let Some(rate) = self.fetch_day(d).await {
                raw.insert(d, rate);
            }
            d = d.succ_opt().expect("date arithmetic in range");
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

/// Pulls the USD rate out of an NBRK response, discarding malformed or
/// zero values (spec.md §4.3 step 3).
fn parse_nbrk_usd(doc: &NbrkRates) -> Option<Decimal> {
    for item in &doc.items {
        if item.title.trim() != "USD" {
            continue;
        }

        let raw = item.description.trim().replace(',', ".");
        if raw.is_empty() {
            return None;
        }
        let rate: Decimal = raw.parse().ok()?;
        if rate.is_zero() {
            return None;
        }
        return Some(rate);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn doc_with(title: &str, description: &str) -> NbrkRates {
        NbrkRates {
            items: vec![NbrkItem {
                title: title.to_string(),
                description: description.to_string(),
            }],
        }
    }

    // -- record parsing --

    #[test]
    fn extracts_usd_rate() {
        let doc = doc_with("USD", "471.32");
        assert_eq!(parse_nbrk_usd(&doc), Some(dec!(471.32)));
    }

    #[test]
    fn ignores_non_usd_items() {
        let doc = doc_with("EUR", "500.00");
        assert_eq!(parse_nbrk_usd(&doc), None);
    }

    #[test]
    fn rejects_zero_rate() {
        let doc = doc_with("USD", "0");
        assert_eq!(parse_nbrk_usd(&doc), None);
    }

    #[test]
    fn rejects_unparseable_rate() {
        let doc = doc_with("USD", "n/a");
        assert_eq!(parse_nbrk_usd(&doc), None);
    }

    #[test]
    fn handles_comma_decimal_separator() {
        let doc = doc_with("USD", "471,32");
        assert_eq!(parse_nbrk_usd(&doc), Some(dec!(471.32)));
    }
}
