pub mod cached_historical_price_store;
pub mod historical_price_store;
pub mod tenant_symbol_store;
pub mod versioned_map;

pub use cached_historical_price_store::CachedHistoricalPriceStore;
pub use historical_price_store::{HistoricalPriceStore, PgHistoricalPriceStore};
pub use tenant_symbol_store::{PgTenantSymbolStore, TenantSymbolStore};
