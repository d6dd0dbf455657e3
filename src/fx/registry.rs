use std::collections::HashMap;
use std::sync::Arc;

use super::FxSource;

/// Maps currency code to the source that owns it (spec.md §4.4). Adding a
/// new currency is one `register` call; the registry itself never fetches
/// or stores rates.
#[derive(Default)]
pub struct FxRegistry {
    sources: HashMap<String, Arc<dyn FxSource>>,
}

impl FxRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    pub fn register(&mut self, source: Arc<dyn FxSource>) {
        self.sources.insert(source.currency().to_string(), source);
    }

    pub fn get(&self, currency: &str) -> Option<Arc<dyn FxSource>> {
        self.sources.get(currency).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn FxSource>> {
        self.sources.values().cloned().collect()
    }
}
