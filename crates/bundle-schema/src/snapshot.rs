//! Collector snapshot records - the read-only inputs to discovery.
//!
//! The host-side collector enumerates systemd units, running containers and
//! watched configuration files, then ships them as one `NodeSnapshot` per
//! node (camelCase JSON on the wire). Collector payload fields the engine
//! does not consume land in each record's `extra` bag instead of being
//! dropped or threaded through the pipeline as dynamic maps.

use crate::quadlet::QuadletDirectives;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the collector knows about one node at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSnapshot {
    /// Node (host) name; becomes the bundle id prefix.
    pub node_name: String,
    /// All known systemd units, managed and unmanaged.
    pub services: Vec<ServiceUnit>,
    /// All running (or recently running) containers.
    pub containers: Vec<EnrichedContainer>,
    /// Watched configuration files keyed by absolute path.
    pub files: BTreeMap<String, WatchedFile>,
}

/// One systemd unit as reported by the collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceUnit {
    /// Unit name, e.g. `web.service`.
    pub name: String,
    /// On-disk unit path, if known.
    pub unit_path: Option<String>,
    /// Fragment path (the generated or source unit file), if known.
    pub fragment_path: Option<String>,
    /// `Requires=` targets in declaration order.
    pub requires: Vec<String>,
    /// `After=` targets in declaration order.
    pub after: Vec<String>,
    /// `Wants=` targets in declaration order.
    pub wants: Vec<String>,
    /// `BindsTo=` targets in declaration order.
    pub binds_to: Vec<String>,
    /// Pod this unit claims membership in, if the collector resolved one.
    pub pod_reference: Option<String>,
    /// Collector-side parse of the unit file. May be stale; discovery
    /// re-parses from `files` when the content is available.
    pub quadlet_directives: Option<QuadletDirectives>,
    /// True when the management layer registered this unit itself.
    pub is_managed: bool,
    /// True for the management tool's own units (always excluded).
    pub is_agent: bool,
    /// True for the reverse-proxy unit (always excluded).
    pub is_reverse_proxy: bool,
    /// Container ids this unit is believed to control.
    pub container_ids: Vec<String>,
    /// Collector fields not consumed by discovery.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One running container as reported by the collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrichedContainer {
    /// Container id.
    pub id: String,
    /// Name list; the first entry is the primary name.
    pub names: Vec<String>,
    /// Image reference.
    pub image: String,
    /// Lifecycle state (`running`, `exited`, ...).
    pub state: String,
    /// Pod id, if the container belongs to a pod.
    pub pod_id: Option<String>,
    /// Pod name, if the container belongs to a pod.
    pub pod_name: Option<String>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Published ports.
    pub ports: Vec<PublishedPort>,
    /// Collector fields not consumed by discovery.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EnrichedContainer {
    /// Primary display name: first name entry, else a short id prefix.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.names.first() {
            return name.trim_start_matches('/').to_string();
        }
        self.id.chars().take(12).collect()
    }
}

/// One published port mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishedPort {
    /// Host IP the port is bound to, when restricted.
    pub host_ip: Option<String>,
    /// Port on the host.
    pub host_port: u16,
    /// Port inside the container.
    pub container_port: u16,
    /// `tcp` or `udp`.
    pub protocol: String,
}

/// One watched configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchedFile {
    /// Absolute path on the node.
    pub path: String,
    /// Last-modified time, if captured.
    pub modified_at: Option<DateTime<Utc>>,
    /// Full text content; absent when the collector has not captured it yet.
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_round_trips_extra_fields() {
        let json = r#"{
            "nodeName": "node-1",
            "services": [{"name": "web.service", "cgroup": "/system.slice"}],
            "containers": [{"id": "abc", "image": "nginx", "state": "running", "exitCode": 0}],
            "files": {}
        }"#;
        let snapshot: NodeSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.node_name, "node-1");
        assert_eq!(snapshot.services[0].name, "web.service");
        assert!(snapshot.services[0].extra.contains_key("cgroup"));
        assert!(snapshot.containers[0].extra.contains_key("exitCode"));
    }

    #[test]
    fn test_container_display_name() {
        let container = EnrichedContainer {
            id: "0123456789abcdef".to_string(),
            names: vec!["/web-1".to_string()],
            ..Default::default()
        };
        assert_eq!(container.display_name(), "web-1");

        let unnamed = EnrichedContainer {
            id: "0123456789abcdef".to_string(),
            ..Default::default()
        };
        assert_eq!(unnamed.display_name(), "0123456789ab");
    }
}
