use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::CoinDictionary;
use crate::store::TenantSymbolStore;

/// Resolves a provider symbol to a canonical coin-gecko coin id (spec.md
/// §4.5). Checks the immutable static dictionary first; only when
/// `tenant_id` is present does it fall back to the tenant-symbol store —
/// the threading SPEC_FULL.md §C.1 settles Open Question 1 with.
pub struct CoinIdResolver {
    dictionary: Arc<CoinDictionary>,
    tenant_symbols: Arc<dyn TenantSymbolStore>,
}

impl CoinIdResolver {
    pub fn new(dictionary: Arc<CoinDictionary>, tenant_symbols: Arc<dyn TenantSymbolStore>) -> Self {
        Self {
            dictionary,
            tenant_symbols,
        }
    }

    pub async fn resolve(&self, tenant_id: Option<Uuid>, source: &str, symbol: &str) -> AppResult<String> {
        if let Some(coin_id) = self.dictionary.lookup(symbol) {
            return Ok(coin_id);
        }

        if let Some(tenant_id) = tenant_id {
            let overrides = self
                .tenant_symbols
                .get_list(tenant_id, source, &[symbol.to_string()])
                .await?;
            if let Some(found) = overrides.into_iter().find(|o| o.symbol == symbol) {
                return Ok(found.coin_id);
            }
        }

        Err(AppError::UnknownSymbol(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::models::TenantSymbol;

    struct FakeTenantSymbolStore {
        rows: Mutex<HashMap<(Uuid, String, String), TenantSymbol>>,
    }

    impl FakeTenantSymbolStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
            }
        }

        fn seed(&self, s: TenantSymbol) {
            self.rows
                .lock()
                .unwrap()
                .insert((s.tenant_id, s.source.clone(), s.symbol.clone()), s);
        }
    }

    #[async_trait]
    impl TenantSymbolStore for FakeTenantSymbolStore {
        async fn upsert(&self, s: &TenantSymbol) -> AppResult<()> {
            self.seed(s.clone());
            Ok(())
        }

        async fn delete(&self, tenant_id: Uuid, source: &str, symbol: &str) -> AppResult<()> {
            self.rows
                .lock()
                .unwrap()
                .remove(&(tenant_id, source.to_string(), symbol.to_string()));
            Ok(())
        }

        async fn get_list(
            &self,
            tenant_id: Uuid,
            source: &str,
            symbols: &[String],
        ) -> AppResult<Vec<TenantSymbol>> {
            let rows = self.rows.lock().unwrap();
            Ok(symbols
                .iter()
                .filter_map(|sym| rows.get(&(tenant_id, source.to_string(), sym.clone())).cloned())
                .collect())
        }

        async fn get_list_by_source(&self, tenant_id: Uuid, source: &str) -> AppResult<Vec<TenantSymbol>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .values()
                .filter(|s| s.tenant_id == tenant_id && s.source == source)
                .cloned()
                .collect())
        }
    }

    fn dictionary_with(entries: &[(&str, &str)]) -> Arc<CoinDictionary> {
        let yaml = entries
            .iter()
            .map(|(sym, id)| format!("  - symbol: {sym}\n    coin_id: {id}\n"))
            .collect::<String>();
        let contents = format!("coins:\n{yaml}");

        let mut path = std::env::temp_dir();
        path.push(format!("resolver_test_dict_{}.yaml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        let dict = CoinDictionary::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        Arc::new(dict)
    }

    #[tokio::test]
    async fn resolves_from_dictionary_without_a_tenant() {
        let dict = dictionary_with(&[("BTC", "bitcoin")]);
        let store = Arc::new(FakeTenantSymbolStore::new());
        let resolver = CoinIdResolver::new(dict, store);

        let coin_id = resolver.resolve(None, "coingecko", "BTC").await.unwrap();
        assert_eq!(coin_id, "bitcoin");
    }

    #[tokio::test]
    async fn falls_back_to_tenant_override_when_tenant_present_and_dictionary_misses() {
        let dict = dictionary_with(&[("BTC", "bitcoin")]);
        let store = Arc::new(FakeTenantSymbolStore::new());
        let tenant_id = Uuid::new_v4();
        store.seed(TenantSymbol::new(tenant_id, "coingecko", "WRAPPEDXYZ", "xyz-token"));

        let resolver = CoinIdResolver::new(dict, store);
        let coin_id = resolver
            .resolve(Some(tenant_id), "coingecko", "WRAPPEDXYZ")
            .await
            .unwrap();
        assert_eq!(coin_id, "xyz-token");
    }

    #[tokio::test]
    async fn does_not_consult_tenant_store_without_a_tenant_id() {
        let dict = dictionary_with(&[("BTC", "bitcoin")]);
        let store = Arc::new(FakeTenantSymbolStore::new());
        store.seed(TenantSymbol::new(Uuid::new_v4(), "coingecko", "WRAPPEDXYZ", "xyz-token"));

        let resolver = CoinIdResolver::new(dict, store);
        let result = resolver.resolve(None, "coingecko", "WRAPPEDXYZ").await;
        assert!(matches!(result, Err(AppError::UnknownSymbol(_))));
    }

    #[tokio::test]
    async fn unknown_symbol_in_both_dictionary_and_tenant_store_fails() {
        let dict = dictionary_with(&[("BTC", "bitcoin")]);
        let store = Arc::new(FakeTenantSymbolStore::new());
        let resolver = CoinIdResolver::new(dict, store);

        let result = resolver.resolve(Some(Uuid::new_v4()), "coingecko", "NOPE").await;
        assert!(matches!(result, Err(AppError::UnknownSymbol(_))));
    }
}
