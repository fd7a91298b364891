//! In-memory index shared by the volatile and durable store backends.
//!
//! Every mutating operation takes the write guard for its entire
//! read-compute-write sequence, which is what makes the store's external
//! behavior indistinguishable from fully serial execution even though reads
//! run concurrently via the same `RwLock`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use taskd_primitives::{AgentAddress, AgentName};
use tokio::sync::RwLock;

use crate::record::{classify, AgentRecord, Liveness};
use crate::store::{Stats, StoreError, StoreResult};

pub(crate) struct MemoryIndex {
    records: RwLock<HashMap<AgentName, AgentRecord>>,
    active_window: chrono::Duration,
}

impl MemoryIndex {
    pub(crate) fn new(active_window: chrono::Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            active_window,
        }
    }

    pub(crate) fn from_records(
        records: impl IntoIterator<Item = AgentRecord>,
        active_window: chrono::Duration,
    ) -> Self {
        let map = records.into_iter().map(|r| (r.name.clone(), r)).collect();
        Self {
            records: RwLock::new(map),
            active_window,
        }
    }

    /// Upserts a record, returning the record to persist (caller durably
    /// writes it before or after this call completes, per backend).
    pub(crate) async fn register(
        &self,
        name: AgentName,
        address: AgentAddress,
        now: DateTime<Utc>,
    ) -> AgentRecord {
        let mut guard = self.records.write().await;
        let record = match guard.get(&name) {
            Some(existing) => AgentRecord {
                name,
                address,
                registered_at: existing.registered_at,
                updated_at: now,
                last_heartbeat: now,
                last_info_collected: existing.last_info_collected,
                system_info: existing.system_info.clone(),
                version: existing.version.clone(),
            },
            None => AgentRecord::new(name, address, now),
        };
        guard.insert(record.name.clone(), record.clone());
        record
    }

    pub(crate) async fn heartbeat(
        &self,
        name: &AgentName,
        now: DateTime<Utc>,
    ) -> StoreResult<AgentRecord> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        record.last_heartbeat = now;
        record.updated_at = now;
        Ok(record.clone())
    }

    pub(crate) async fn update_system_info(
        &self,
        name: &AgentName,
        info: serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<AgentRecord> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        record.system_info = Some(info);
        record.last_info_collected = Some(now);
        record.updated_at = now;
        Ok(record.clone())
    }

    pub(crate) async fn update_version(
        &self,
        name: &AgentName,
        version: String,
        now: DateTime<Utc>,
    ) -> StoreResult<AgentRecord> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        record.version = Some(version);
        record.updated_at = now;
        Ok(record.clone())
    }

    pub(crate) async fn get(&self, name: &AgentName) -> StoreResult<AgentRecord> {
        let guard = self.records.read().await;
        guard
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.clone()))
    }

    pub(crate) async fn get_address(
        &self,
        name: &AgentName,
        now: DateTime<Utc>,
    ) -> StoreResult<AgentAddress> {
        let guard = self.records.read().await;
        let record = guard
            .get(name)
            .ok_or_else(|| StoreError::NotFoundOrInactive(name.clone()))?;
        match record.liveness(now, self.active_window) {
            Liveness::Active => Ok(record.address.clone()),
            Liveness::Inactive => Err(StoreError::NotFoundOrInactive(name.clone())),
        }
    }

    pub(crate) async fn list(&self) -> Vec<AgentRecord> {
        let guard = self.records.read().await;
        let mut records: Vec<AgentRecord> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        records
    }

    pub(crate) async fn remove(&self, name: &AgentName) -> StoreResult<()> {
        let mut guard = self.records.write().await;
        guard
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.clone()))
    }

    /// Removes records older than `retention_hours`, returning the removed
    /// names so a durable backend can evict them from disk too.
    pub(crate) async fn gc_inactive(
        &self,
        retention_hours: i64,
        now: DateTime<Utc>,
    ) -> Vec<AgentName> {
        let threshold = chrono::Duration::hours(retention_hours);
        let mut guard = self.records.write().await;
        let stale: Vec<AgentName> = guard
            .values()
            .filter(|record| now - record.last_heartbeat > threshold)
            .map(|record| record.name.clone())
            .collect();
        for name in &stale {
            guard.remove(name);
        }
        stale
    }

    pub(crate) async fn stats(&self, now: DateTime<Utc>) -> Stats {
        let guard = self.records.read().await;
        let mut stats = Stats {
            total: guard.len(),
            ..Stats::default()
        };
        for record in guard.values() {
            match record.liveness(now, self.active_window) {
                Liveness::Active => stats.active += 1,
                Liveness::Inactive => stats.inactive += 1,
            }
        }
        stats
    }
}
