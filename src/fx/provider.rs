use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

use super::{next_run_time, FxRegistry};

/// The FX boundary the pricing use case drives. Lets the use case hold
/// `Arc<dyn FiatRateSource>` so it can be exercised in tests against a
/// fixed rate table instead of the live scheduled sources.
#[async_trait]
pub trait FiatRateSource: Send + Sync {
    async fn get_usd_to_fiat_rate(&self, day: DateTime<Utc>, fiat: &str) -> AppResult<Decimal>;
}

/// Facade over the FX source registry: starts one poll loop per source and
/// serves `get_usd_to_fiat_rate` lookups (spec.md §4.4).
pub struct FxProvider {
    registry: FxRegistry,
}

impl FxProvider {
    pub fn new(registry: FxRegistry) -> Self {
        Self { registry }
    }

    /// Spawns one long-running task per registered source, each running
    /// `run_loop`. Returns immediately; the tasks run until `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) {
        for source in self.registry.all() {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_loop(source, cancel).await;
            });
        }
    }

}

#[async_trait]
impl FiatRateSource for FxProvider {
    async fn get_usd_to_fiat_rate(&self, day: DateTime<Utc>, fiat: &str) -> AppResult<Decimal> {
        let source = self
            .registry
            .get(fiat)
            .ok_or_else(|| AppError::UnsupportedFiat(fiat.to_string()))?;

        source.get(day).ok_or_else(|| AppError::FXUnavailable {
            currency: fiat.to_string(),
            day: day.date_naive().to_string(),
        })
    }
}

async fn run_loop(source: std::sync::Arc<dyn super::FxSource>, cancel: CancellationToken) {
    if let Err(err) = source.update().await {
        tracing::warn!(currency = source.currency(), %err, "fx: initial update failed");
    }

    loop {
        let next = next_run_time(Utc::now(), source.schedule());
        let sleep_for = (next - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(currency = source.currency(), "fx: update loop cancelled");
                return;
            }
            _ = tokio::time::sleep(sleep_for) => {
                if let Err(err) = source.update().await {
                    tracing::warn!(currency = source.currency(), %err, "fx: update failed");
                }
            }
        }
    }
}
