use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::store::versioned_map::VersionedMap;

#[derive(Debug, Deserialize)]
struct CoinEntry {
    symbol: String,
    coin_id: String,
}

#[derive(Debug, Deserialize)]
struct CoinFile {
    coins: Vec<CoinEntry>,
}

/// Static symbol -> coin-gecko coin-id dictionary, loaded once at startup
/// from a YAML file and held in a lock-free map for the lifetime of the
/// process (spec.md §3 "Coin-id dictionary").
pub struct CoinDictionary {
    by_symbol: VersionedMap<String, String>,
}

impl CoinDictionary {
    /// Loads and validates `path`. Rejects blank symbols/coin-ids and
    /// duplicate symbols up front rather than letting them surface later
    /// as silent resolution failures.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let file: CoinFile = serde_yaml::from_str(&raw)?;

        let mut m = HashMap::with_capacity(file.coins.len());
        for (idx, entry) in file.coins.iter().enumerate() {
            let symbol = entry.symbol.trim().to_string();
            let coin_id = entry.coin_id.trim().to_string();

            if symbol.is_empty() || coin_id.is_empty() {
                anyhow::bail!(
                    "coin dictionary: invalid entry at idx={idx} (symbol={:?}, coin_id={:?})",
                    entry.symbol,
                    entry.coin_id
                );
            }
            if m.contains_key(&symbol) {
                anyhow::bail!("coin dictionary: duplicate symbol {symbol:?}");
            }
            m.insert(symbol, coin_id);
        }

        let by_symbol = VersionedMap::new();
        by_symbol.replace_all(m);
        Ok(Self { by_symbol })
    }

    pub fn lookup(&self, symbol: &str) -> Option<String> {
        self.by_symbol.get(&symbol.to_string())
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}
