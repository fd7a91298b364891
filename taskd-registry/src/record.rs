//! The persisted agent record and its derived liveness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskd_primitives::{AgentAddress, AgentName};

/// Derived liveness of an agent. Never stored; always recomputed on read from
/// `last_heartbeat` so that restoring a record after downtime, or clock drift,
/// never leaves a stale status on disk (see [`classify`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Heartbeat observed within the active window.
    Active,
    /// No heartbeat observed, or the last one fell outside the active window.
    Inactive,
}

/// Classifies a record's liveness from its last heartbeat and the current time.
///
/// A record is Active iff it has ever heartbeat *and* `now - last_heartbeat <
/// active_window`; the comparison is strict, so a heartbeat exactly
/// `active_window` old is Inactive.
#[must_use]
pub fn classify(
    last_heartbeat: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    active_window: chrono::Duration,
) -> Liveness {
    match last_heartbeat {
        Some(last) if now - last < active_window => Liveness::Active,
        _ => Liveness::Inactive,
    }
}

/// The sole persisted entity of the registry: one row per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Unique identifier; the registry's primary key.
    pub name: AgentName,
    /// `host:port` the Master dials to reach the agent.
    pub address: AgentAddress,
    /// Wall-clock instant of first registration; immutable after insert.
    pub registered_at: DateTime<Utc>,
    /// Wall-clock instant of the most recent Register or metadata update.
    pub updated_at: DateTime<Utc>,
    /// Wall-clock instant of the most recent Heartbeat.
    pub last_heartbeat: DateTime<Utc>,
    /// Wall-clock instant of the most recent successful system-info update.
    pub last_info_collected: Option<DateTime<Utc>>,
    /// Opaque, last-reported system information blob.
    pub system_info: Option<serde_json::Value>,
    /// Reported agent build identifier.
    pub version: Option<String>,
}

impl AgentRecord {
    /// Creates a freshly registered record: `registered_at`, `updated_at`, and
    /// `last_heartbeat` are all set to `now` (I-2, I-4 of the registry contract).
    #[must_use]
    pub fn new(name: AgentName, address: AgentAddress, now: DateTime<Utc>) -> Self {
        Self {
            name,
            address,
            registered_at: now,
            updated_at: now,
            last_heartbeat: now,
            last_info_collected: None,
            system_info: None,
            version: None,
        }
    }

    /// Returns the record's derived liveness at `now`.
    #[must_use]
    pub fn liveness(&self, now: DateTime<Utc>, active_window: chrono::Duration) -> Liveness {
        classify(Some(self.last_heartbeat), now, active_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window() -> Duration {
        Duration::seconds(60)
    }

    #[test]
    fn never_heartbeat_is_inactive() {
        assert_eq!(classify(None, Utc::now(), window()), Liveness::Inactive);
    }

    #[test]
    fn just_under_window_is_active() {
        let now = Utc::now();
        let last = now - Duration::seconds(59);
        assert_eq!(classify(Some(last), now, window()), Liveness::Active);
    }

    #[test]
    fn exactly_at_window_is_inactive() {
        let now = Utc::now();
        let last = now - Duration::seconds(60);
        assert_eq!(classify(Some(last), now, window()), Liveness::Inactive);
    }

    #[test]
    fn just_over_window_is_inactive() {
        let now = Utc::now();
        let last = now - Duration::seconds(61);
        assert_eq!(classify(Some(last), now, window()), Liveness::Inactive);
    }
}
