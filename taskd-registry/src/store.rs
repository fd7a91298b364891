//! The `Store` trait: the single source of truth for agent records.

use async_trait::async_trait;
use taskd_primitives::{AgentAddress, AgentName};
use thiserror::Error;

use crate::record::AgentRecord;

/// Result alias for registry store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the registry store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record matches the given name.
    #[error("agent not found: {0}")]
    NotFound(AgentName),

    /// A record matches the given name but is not currently Active, so it is
    /// not eligible for dispatch. Distinct from `NotFound` per the dispatch
    /// admission contract.
    #[error("agent not found or inactive: {0}")]
    NotFoundOrInactive(AgentName),

    /// A required field was missing or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The durable backing store could not complete the operation.
    #[error("registry persistence error: {0}")]
    Persistence(String),
}

/// Point-in-time counts derived from the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Total number of registered agents, regardless of liveness.
    pub total: usize,
    /// Number currently classified Active.
    pub active: usize,
    /// Number currently classified Inactive.
    pub inactive: usize,
}

/// Durable, concurrency-safe inventory of agent records.
///
/// Implementations must serialize mutating operations (writer-exclusive
/// discipline) while allowing readers to run concurrently with one another,
/// and must never hold a lock across an `.await` suspension point other than
/// the store's own short-lived durable write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomic upsert. Preserves `registered_at` on update; always refreshes
    /// `address`, `updated_at`, and `last_heartbeat` to now (I-4).
    async fn register(&self, name: AgentName, address: AgentAddress) -> StoreResult<()>;

    /// Sets `last_heartbeat = now` for an existing record. Never creates one
    /// (I-5): returns [`StoreError::NotFound`] for an unknown name, with no
    /// side effects.
    async fn heartbeat(&self, name: &AgentName) -> StoreResult<()>;

    /// Best-effort update of the last-reported system-info blob; also bumps
    /// `last_info_collected`. `NotFound` if the agent is not registered.
    async fn update_system_info(
        &self,
        name: &AgentName,
        info: serde_json::Value,
    ) -> StoreResult<()>;

    /// Best-effort update of the last-reported version string.
    async fn update_version(&self, name: &AgentName, version: String) -> StoreResult<()>;

    /// Returns the full record regardless of liveness.
    async fn get(&self, name: &AgentName) -> StoreResult<AgentRecord>;

    /// Returns the agent's dial address, gated on liveness: fails with
    /// [`StoreError::NotFoundOrInactive`] if the agent is unknown or Inactive.
    /// This is the sole admission gate for outbound dispatch.
    async fn get_address(&self, name: &AgentName) -> StoreResult<AgentAddress>;

    /// All records, ordered by name, as a single consistent snapshot.
    async fn list(&self) -> StoreResult<Vec<AgentRecord>>;

    /// Deletes a record. `NotFound` if absent.
    async fn remove(&self, name: &AgentName) -> StoreResult<()>;

    /// Deletes every record whose `last_heartbeat` is strictly older than
    /// `retention_hours`. Returns the count removed.
    async fn gc_inactive(&self, retention_hours: i64) -> StoreResult<usize>;

    /// Derived liveness counts over the current record set.
    async fn stats(&self) -> StoreResult<Stats>;
}
