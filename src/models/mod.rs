pub mod coin_dictionary;
pub mod historical_price;
pub mod tenant_symbol;

pub use coin_dictionary::CoinDictionary;
pub use historical_price::{
    floor_to_bucket, truncate_to_day_utc, GranularitySeconds, HistoricalPrice, PriceKey,
};
pub use tenant_symbol::TenantSymbol;
