use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use quill_provider::RequestId;

/// Set of in-flight sensitive-operation ids.
///
/// The registry knows nothing about update mechanics; it only exposes the
/// gating predicate an external update manager consults before applying a
/// self-update. Membership is a set, not a counter — registering the same id
/// twice is safe.
#[derive(Default)]
pub struct CriticalOperationRegistry {
    ids: Mutex<HashSet<RequestId>>,
}

impl CriticalOperationRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, id: &str) {
        let inserted = self.ids.lock().expect("critical registry poisoned").insert(id.to_string());
        if inserted {
            log::debug!("critical operation registered: {id}");
        }
    }

    pub fn unregister(&self, id: &str) {
        let removed = self.ids.lock().expect("critical registry poisoned").remove(id);
        if removed {
            log::debug!("critical operation cleared: {id}");
        }
    }

    /// `true` while any sensitive workflow is in flight; updates must wait.
    pub fn has_critical_operations(&self) -> bool {
        !self.ids.lock().expect("critical registry poisoned").is_empty()
    }

    /// Snapshot of the registered ids.
    pub fn active(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> =
            self.ids.lock().expect("critical registry poisoned").iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Register `id` and get a guard that unregisters it on drop.
    ///
    /// Workflows hold the guard across every suspension point; success,
    /// cancellation, timeout, and unwind all release the gate exactly once.
    pub fn guard(self: &Arc<Self>, id: &str) -> CriticalOperationGuard {
        self.register(id);
        CriticalOperationGuard { registry: Arc::clone(self), id: id.to_string() }
    }
}

/// RAII handle for one registered critical operation.
pub struct CriticalOperationGuard {
    registry: Arc<CriticalOperationRegistry>,
    id: RequestId,
}

impl CriticalOperationGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for CriticalOperationGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_tracks_set_membership() {
        let registry = CriticalOperationRegistry::new();
        assert!(!registry.has_critical_operations());

        registry.register("op-1");
        registry.register("op-1");
        registry.register("op-2");
        assert!(registry.has_critical_operations());
        assert_eq!(registry.active(), vec!["op-1".to_string(), "op-2".to_string()]);

        registry.unregister("op-1");
        assert!(registry.has_critical_operations());
        registry.unregister("op-2");
        assert!(!registry.has_critical_operations());
        // Unregistering an unknown id is a no-op.
        registry.unregister("op-2");
    }

    #[test]
    fn guard_clears_registration_on_drop() {
        let registry = CriticalOperationRegistry::new();
        {
            let _guard = registry.guard("op-9");
            assert!(registry.has_critical_operations());
        }
        assert!(!registry.has_critical_operations());
    }

    #[test]
    fn guard_clears_registration_on_unwind() {
        let registry = CriticalOperationRegistry::new();
        let cloned = Arc::clone(&registry);
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.guard("op-panic");
            panic!("workflow blew up");
        });
        assert!(result.is_err());
        assert!(!registry.has_critical_operations());
    }
}
