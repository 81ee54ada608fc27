// src/grant.rs
//
// The grant lookup capability consumed read-only by the MCP proxy's local
// resolver (spec §4.4, §6.1). The real grant store (persisted OAuth grants
// for connected email/calendar accounts) lives outside this core and is out
// of scope here; this module defines the interface the proxy needs and an
// in-memory implementation used by tests and by callers who haven't wired up
// real storage yet.

use std::collections::HashMap;
use std::sync::RwLock;

/// A single authorized account grant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GrantInfo {
    pub id: String,
    pub email: String,
    pub provider: String,
}

/// Read-only grant lookup, as consumed by the MCP proxy's local resolver.
///
/// Implementations must be `Send + Sync` since the proxy may be shared
/// across the request mutator and the local resolver.
pub trait GrantLookup: Send + Sync {
    fn get_by_id(&self, id: &str) -> Option<GrantInfo>;
    fn list_all(&self) -> Vec<GrantInfo>;
    fn get_default(&self) -> Option<String>;
}

/// In-memory grant store. Used by tests, and as a drop-in for callers that
/// want the proxy's grant-aware behavior without a real storage backend.
#[derive(Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<HashMap<String, GrantInfo>>,
    default_id: RwLock<Option<String>>,
    // Preserves insertion order so `list_all().first()` is deterministic,
    // matching the "use the first one" rule in spec §4.4.
    order: RwLock<Vec<String>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, grant: GrantInfo) {
        let mut grants = self.grants.write().unwrap();
        let mut order = self.order.write().unwrap();
        if !grants.contains_key(&grant.id) {
            order.push(grant.id.clone());
        }
        grants.insert(grant.id.clone(), grant);
    }

    pub fn set_default(&self, id: impl Into<String>) {
        *self.default_id.write().unwrap() = Some(id.into());
    }
}

impl GrantLookup for InMemoryGrantStore {
    fn get_by_id(&self, id: &str) -> Option<GrantInfo> {
        self.grants.read().unwrap().get(id).cloned()
    }

    fn list_all(&self) -> Vec<GrantInfo> {
        let grants = self.grants.read().unwrap();
        self.order
            .read()
            .unwrap()
            .iter()
            .filter_map(|id| grants.get(id).cloned())
            .collect()
    }

    fn get_default(&self) -> Option<String> {
        self.default_id.read().unwrap().clone()
    }
}
