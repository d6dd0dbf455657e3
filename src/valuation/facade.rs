use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::pricing::{HistoricalPriceUseCase, PricingKey};
use crate::resolver::CoinIdResolver;

/// The symbol-resolution "source" namespace the valuation facade resolves
/// against. `ValuateTransactionsBatch` carries no tenant/source — resolution
/// only ever reaches the dictionary branch of `CoinIdResolver::resolve`
/// (SPEC_FULL.md §C.1, same as the original's unwired tenant path).
const RESOLVER_SOURCE: &str = "coingecko";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    In,
    Out,
    Fee,
}

#[derive(Debug, Clone)]
pub struct MoneyLeg {
    pub symbol: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub tx_id: String,
    pub time_utc: Option<DateTime<Utc>>,
    pub in_money: Option<MoneyLeg>,
    pub out_money: Option<MoneyLeg>,
    pub fee_money: Option<MoneyLeg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetErrorCode {
    Unknown,
    Ambiguous,
}

#[derive(Debug, Clone)]
pub struct AssetError {
    pub symbol: String,
    pub code: AssetErrorCode,
    pub message: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FiatLeg {
    pub fiat: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValuatedTx {
    pub tx_id: String,
    pub in_fiat: Option<FiatLeg>,
    pub out_fiat: Option<FiatLeg>,
    pub fee_fiat: Option<FiatLeg>,
    pub errors: Vec<AssetError>,
}

struct Slot {
    tx_idx: usize,
    kind: LegKind,
}

/// Orchestrates symbol resolution and pricing across a batch of
/// transactions (spec.md §4.7). Per-leg resolver failures are isolated into
/// that transaction's `errors` list; only a missing `time_utc` or a
/// provider/FX failure fails the whole call.
pub struct ValuationFacade {
    resolver: Arc<CoinIdResolver>,
    pricing: Arc<HistoricalPriceUseCase>,
}

impl ValuationFacade {
    pub fn new(resolver: Arc<CoinIdResolver>, pricing: Arc<HistoricalPriceUseCase>) -> Self {
        Self { resolver, pricing }
    }

    pub async fn valuate_transactions_batch(
        &self,
        fiat_currency: &str,
        transactions: &[Transaction],
    ) -> AppResult<Vec<ValuatedTx>> {
        let mut out: Vec<ValuatedTx> = Vec::with_capacity(transactions.len());
        let mut slots: Vec<Slot> = Vec::new();
        let mut price_keys: Vec<PricingKey> = Vec::new();

        for (idx, tx) in transactions.iter().enumerate() {
            let Some(time_utc) = tx.time_utc else {
                return Err(AppError::InvalidArgument(format!(
                    "transaction {idx}: missing time_utc"
                )));
            };

            let mut result = ValuatedTx {
                tx_id: tx.tx_id.clone(),
                ..Default::default()
            };

            for (kind, leg) in [
                (LegKind::In, &tx.in_money),
                (LegKind::Out, &tx.out_money),
                (LegKind::Fee, &tx.fee_money),
            ] {
                let Some(leg) = leg else { continue };

                match self.resolver.resolve(None, RESOLVER_SOURCE, &leg.symbol).await {
                    Ok(coin_id) => {
                        slots.push(Slot { tx_idx: idx, kind });
                        price_keys.push(PricingKey {
                            coin_id,
                            tx_time_utc: time_utc,
                        });
                    }
                    Err(err) => {
                        result.errors.push(AssetError {
                            symbol: leg.symbol.clone(),
                            code: AssetErrorCode::Unknown,
                            message: format!("symbol to coin-id resolution failed: {err}"),
                            candidates: Vec::new(),
                        });
                    }
                }
            }

            out.push(result);
        }

        if slots.is_empty() {
            return Ok(out);
        }

        let fiats = self.pricing.get_historical_prices(fiat_currency, &price_keys).await?;
        if fiats.len() != price_keys.len() {
            return Err(AppError::Internal(format!(
                "pricing invariant violated: got {} results for {} keys",
                fiats.len(),
                price_keys.len()
            )));
        }

        for (slot, fiat) in slots.iter().zip(fiats.iter()) {
            let leg = FiatLeg {
                fiat: fiat.to_string(),
            };
            let tx = &mut out[slot.tx_idx];
            match slot.kind {
                LegKind::In => tx.in_fiat = Some(leg),
                LegKind::Out => tx.out_fiat = Some(leg),
                LegKind::Fee => tx.fee_fiat = Some(leg),
            }
        }

        Ok(out)
    }
}
