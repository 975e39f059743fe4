//! Shared fixtures for in-crate tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::registry::{ResolverMap, ViewHandle, WidgetRegistry};

/// Resolver that counts how many times each path was resolved.
#[derive(Clone, Default)]
pub struct CountingResolver {
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl CountingResolver {
    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .map(|guard| guard.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn map(&self, paths: &[&str]) -> ResolverMap {
        let mut map = ResolverMap::new();
        for path in paths {
            let calls = self.calls.clone();
            let owned = path.to_string();
            map.insert(*path, move || {
                if let Ok(mut guard) = calls.lock() {
                    *guard.entry(owned.clone()).or_default() += 1;
                }
                let view = ViewHandle::new(owned.clone());
                async move { Ok(view) }
            });
        }
        map
    }

    pub fn registry(&self, paths: &[&str]) -> WidgetRegistry {
        WidgetRegistry::new(Arc::new(self.map(paths)))
    }
}
