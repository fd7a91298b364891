//! System-information capture attached to periodic heartbeats.
//!
//! The Master treats the resulting blob as opaque (it only round-trips it);
//! [`taskd_proto::SystemInfo`] gives this agent a concrete shape to fill in.

use std::collections::HashMap;

use sysinfo::System;
use taskd_proto::SystemInfo;

/// Captures a fresh snapshot of host system information.
#[must_use]
pub fn capture() -> SystemInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_usage();

    SystemInfo {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        os: System::name().unwrap_or_else(|| "unknown".to_string()),
        os_version: System::os_version(),
        cpu_count: sys.cpus().len(),
        total_memory_bytes: sys.total_memory(),
        available_memory_bytes: sys.available_memory(),
        uptime_secs: System::uptime(),
        extra: HashMap::new(),
    }
}

/// Captures and serializes a snapshot as the opaque JSON value heartbeats carry.
///
/// # Panics
///
/// Never: [`SystemInfo`] only contains JSON-representable fields.
#[must_use]
pub fn capture_json() -> serde_json::Value {
    serde_json::to_value(capture()).expect("SystemInfo always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_fills_in_a_hostname() {
        let snapshot = capture();
        assert!(!snapshot.hostname.is_empty());
    }

    #[test]
    fn capture_json_produces_an_object_with_expected_keys() {
        let value = capture_json();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("cpu_count"));
        assert!(obj.contains_key("total_memory_bytes"));
        assert!(obj.contains_key("uptime_secs"));
    }
}
