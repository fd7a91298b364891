//! Volatile, in-memory-only store backend.
//!
//! Intended for tests and for `--standalone` agent runs that never need a
//! Master-side registry. **Data loss on restart**: nothing here survives
//! process exit: there is no backing file, and a fresh [`VolatileStore`]
//! always starts empty.

use async_trait::async_trait;
use chrono::Utc;
use taskd_primitives::{AgentAddress, AgentName};

use crate::index::MemoryIndex;
use crate::record::AgentRecord;
use crate::store::{Stats, Store, StoreResult};

/// In-memory [`Store`] with no durability. See module docs for the data-loss
/// caveat this backend accepts in exchange for zero setup cost.
pub struct VolatileStore {
    index: MemoryIndex,
}

impl VolatileStore {
    /// Creates an empty store using the given active window for liveness.
    #[must_use]
    pub fn new(active_window: chrono::Duration) -> Self {
        Self {
            index: MemoryIndex::new(active_window),
        }
    }
}

impl Default for VolatileStore {
    fn default() -> Self {
        Self::new(chrono::Duration::seconds(60))
    }
}

#[async_trait]
impl Store for VolatileStore {
    async fn register(&self, name: AgentName, address: AgentAddress) -> StoreResult<()> {
        self.index.register(name, address, Utc::now()).await;
        Ok(())
    }

    async fn heartbeat(&self, name: &AgentName) -> StoreResult<()> {
        self.index.heartbeat(name, Utc::now()).await.map(|_| ())
    }

    async fn update_system_info(
        &self,
        name: &AgentName,
        info: serde_json::Value,
    ) -> StoreResult<()> {
        self.index
            .update_system_info(name, info, Utc::now())
            .await
            .map(|_| ())
    }

    async fn update_version(&self, name: &AgentName, version: String) -> StoreResult<()> {
        self.index
            .update_version(name, version, Utc::now())
            .await
            .map(|_| ())
    }

    async fn get(&self, name: &AgentName) -> StoreResult<AgentRecord> {
        self.index.get(name).await
    }

    async fn get_address(&self, name: &AgentName) -> StoreResult<AgentAddress> {
        self.index.get_address(name, Utc::now()).await
    }

    async fn list(&self) -> StoreResult<Vec<AgentRecord>> {
        Ok(self.index.list().await)
    }

    async fn remove(&self, name: &AgentName) -> StoreResult<()> {
        self.index.remove(name).await
    }

    async fn gc_inactive(&self, retention_hours: i64) -> StoreResult<usize> {
        Ok(self.index.gc_inactive(retention_hours, Utc::now()).await.len())
    }

    async fn stats(&self) -> StoreResult<Stats> {
        Ok(self.index.stats(Utc::now()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> AgentAddress {
        AgentAddress::new("10.0.0.1:50051").unwrap()
    }

    #[tokio::test]
    async fn register_then_list_shows_active() {
        let store = VolatileStore::default();
        let name = AgentName::new("alpha").unwrap();
        store.register(name.clone(), addr()).await.unwrap();

        let agents = store.list().await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, name);
        assert_eq!(agents[0].address, addr());
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_name_is_not_found_and_has_no_side_effects() {
        let store = VolatileStore::default();
        let ghost = AgentName::new("ghost").unwrap();
        let err = store.heartbeat(&ghost).await.unwrap_err();
        assert!(matches!(err, crate::StoreError::NotFound(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_preserves_registered_at_across_reregistration() {
        let store = VolatileStore::default();
        let name = AgentName::new("alpha").unwrap();
        store.register(name.clone(), addr()).await.unwrap();
        let first = store.get(&name).await.unwrap();

        let new_addr = AgentAddress::new("10.0.0.2:50051").unwrap();
        store.register(name.clone(), new_addr.clone()).await.unwrap();
        let second = store.get(&name).await.unwrap();

        assert_eq!(second.registered_at, first.registered_at);
        assert_eq!(second.address, new_addr);
    }

    #[tokio::test]
    async fn get_address_rejects_inactive_agent() {
        let store = VolatileStore::new(chrono::Duration::seconds(0));
        let name = AgentName::new("beta").unwrap();
        store.register(name.clone(), addr()).await.unwrap();

        // active_window of zero means the record is immediately inactive.
        let err = store.get_address(&name).await.unwrap_err();
        assert!(matches!(err, crate::StoreError::NotFoundOrInactive(_)));
    }

    #[tokio::test]
    async fn gc_respects_strict_inequality_on_age() {
        let store = VolatileStore::default();
        store
            .register(AgentName::new("a").unwrap(), addr())
            .await
            .unwrap();

        // A record heartbeat exactly `now` has age 0, which must not exceed a
        // 0-hour retention threshold.
        let removed = store.gc_inactive(0).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
