pub mod facade;

pub use facade::{AssetError, AssetErrorCode, FiatLeg, LegKind, MoneyLeg, Transaction, ValuatedTx, ValuationFacade};
