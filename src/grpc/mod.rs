use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::models::TenantSymbol;
use crate::store::TenantSymbolStore;
use crate::valuation::{self, ValuationFacade};

pub mod pb {
    tonic::include_proto!("price.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("price_v1_descriptor");
}

use pb::price_server::Price;

/// Implements the generated `Price` service trait: converts between wire
/// messages and the domain types `ValuationFacade`/`TenantSymbolStore`
/// operate on, and maps `AppError` to a `tonic::Status` at the boundary
/// (spec.md §6 "RPC surface").
pub struct PriceService {
    facade: Arc<ValuationFacade>,
    tenant_symbols: Arc<dyn TenantSymbolStore>,
}

impl PriceService {
    pub fn new(facade: Arc<ValuationFacade>, tenant_symbols: Arc<dyn TenantSymbolStore>) -> Self {
        Self {
            facade,
            tenant_symbols,
        }
    }
}

fn timestamp_to_utc(ts: prost_types::Timestamp) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts.seconds, ts.nanos.max(0) as u32).single()
}

fn decimal_from_amount(amount: &str) -> Result<Decimal, Status> {
    Decimal::from_str(amount)
        .map_err(|err| Status::invalid_argument(format!("invalid decimal amount {amount:?}: {err}")))
}

fn money_leg_from_pb(leg: Option<pb::MoneyLeg>) -> Result<Option<valuation::MoneyLeg>, Status> {
    let Some(leg) = leg else { return Ok(None) };
    Ok(Some(valuation::MoneyLeg {
        symbol: leg.symbol,
        amount: decimal_from_amount(&leg.amount)?,
    }))
}

fn transaction_from_pb(tx: pb::Transaction, idx: usize) -> Result<valuation::Transaction, Status> {
    let time_utc = tx
        .time_utc
        .and_then(timestamp_to_utc)
        .ok_or_else(|| Status::invalid_argument(format!("transaction {idx}: missing time_utc")))?;

    Ok(valuation::Transaction {
        tx_id: tx.tx_id,
        time_utc: Some(time_utc),
        in_money: money_leg_from_pb(tx.in_money)?,
        out_money: money_leg_from_pb(tx.out_money)?,
        fee_money: money_leg_from_pb(tx.fee_money)?,
    })
}

fn asset_error_code_to_pb(code: valuation::AssetErrorCode) -> pb::AssetErrorCode {
    match code {
        valuation::AssetErrorCode::Unknown => pb::AssetErrorCode::AssetUnknown,
        valuation::AssetErrorCode::Ambiguous => pb::AssetErrorCode::AssetAmbiguous,
    }
}

fn fiat_leg_to_pb(leg: Option<valuation::FiatLeg>) -> Option<pb::FiatLeg> {
    leg.map(|l| pb::FiatLeg { fiat: l.fiat })
}

fn valuated_tx_to_pb(tx: valuation::ValuatedTx) -> pb::ValuatedTx {
    pb::ValuatedTx {
        tx_id: tx.tx_id,
        in_fiat: fiat_leg_to_pb(tx.in_fiat),
        out_fiat: fiat_leg_to_pb(tx.out_fiat),
        fee_fiat: fiat_leg_to_pb(tx.fee_fiat),
        errors: tx
            .errors
            .into_iter()
            .map(|e| pb::AssetError {
                symbol: e.symbol,
                code: asset_error_code_to_pb(e.code) as i32,
                message: e.message,
                candidates: e.candidates,
            })
            .collect(),
    }
}

#[tonic::async_trait]
impl Price for PriceService {
    async fn valuate_transactions_batch(
        &self,
        request: Request<pb::ValuateTransactionsRequest>,
    ) -> Result<Response<pb::ValuateTransactionsResponse>, Status> {
        let req = request.into_inner();

        let transactions = req
            .transactions
            .into_iter()
            .enumerate()
            .map(|(idx, tx)| transaction_from_pb(tx, idx))
            .collect::<Result<Vec<_>, Status>>()?;

        let valuated = self
            .facade
            .valuate_transactions_batch(&req.fiat_currency, &transactions)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(pb::ValuateTransactionsResponse {
            transactions: valuated.into_iter().map(valuated_tx_to_pb).collect(),
        }))
    }

    async fn upsert_tenant_symbol(
        &self,
        request: Request<pb::UpsertTenantSymbolRequest>,
    ) -> Result<Response<pb::UpsertTenantSymbolResponse>, Status> {
        let req = request.into_inner();

        let tenant_id = Uuid::parse_str(&req.tenant_id)
            .map_err(|err| Status::invalid_argument(format!("invalid tenant_id: {err}")))?;

        let tenant_symbol = TenantSymbol::new(tenant_id, req.source, req.symbol, req.coin_id);
        self.tenant_symbols.upsert(&tenant_symbol).await.map_err(Status::from)?;

        Ok(Response::new(pb::UpsertTenantSymbolResponse {}))
    }
}
