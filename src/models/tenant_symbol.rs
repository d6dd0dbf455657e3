use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant-scoped override mapping a provider symbol to a coin-gecko coin
/// id, keyed by `(tenant_id, source, symbol)` (spec.md §3, "Tenant-symbol
/// override").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSymbol {
    pub tenant_id: Uuid,
    pub source: String,
    pub symbol: String,
    pub coin_id: String,
}

impl TenantSymbol {
    pub fn new(
        tenant_id: Uuid,
        source: impl Into<String>,
        symbol: impl Into<String>,
        coin_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            source: source.into(),
            symbol: symbol.into(),
            coin_id: coin_id.into(),
        }
    }
}
