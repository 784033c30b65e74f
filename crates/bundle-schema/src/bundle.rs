//! Service bundle aggregates - the output of discovery.

use crate::quadlet::UnitSourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bundle severity, worst validation level first so that sorting
/// ascending surfaces the most broken bundles.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    #[default]
    Info,
}

/// Level of a single bundle validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Error,
    Warning,
    Info,
}

/// One fact about the subject host that makes a bundle less deployable.
/// Validations are reports, never engine failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleValidation {
    pub level: ValidationLevel,
    pub message: String,
}

/// Classification of a related file, derived purely from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Kube,
    Pod,
    Container,
    Yaml,
    Config,
    Unknown,
}

/// A file related to a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleAsset {
    /// Absolute path on the node.
    pub path: String,
    pub kind: AssetKind,
    /// Last-modified time when the file content was captured.
    pub modified_at: Option<DateTime<Utc>>,
}

/// Display-ready projection of a running container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub pod_name: Option<String>,
    pub ports: Vec<BundlePortSummary>,
}

/// Display-ready projection of a published port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePortSummary {
    pub host_ip: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String,
}

/// Whether the management layer registered a member unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Managed,
    Unmanaged,
}

/// Display-ready projection of a member unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleServiceRef {
    /// Full unit name, e.g. `web.service`.
    pub name: String,
    /// Unit suffix and `@instance` qualifier stripped.
    pub display_name: String,
    pub status: ServiceStatus,
    pub unit_type: UnitSourceType,
    pub unit_path: Option<String>,
    /// Why discovery included this unit, in human-readable form.
    pub discovery_hints: Vec<String>,
}

/// Why one debug-graph edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeReason {
    Requires,
    After,
    Wants,
    BindsTo,
    #[serde(rename = "Systemd → container")]
    SystemdToContainer,
    #[serde(rename = "Container → pod")]
    ContainerToPod,
    #[serde(rename = "Pod → container")]
    PodToContainer,
}

impl std::fmt::Display for EdgeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EdgeReason::Requires => "Requires",
            EdgeReason::After => "After",
            EdgeReason::Wants => "Wants",
            EdgeReason::BindsTo => "BindsTo",
            EdgeReason::SystemdToContainer => "Systemd → container",
            EdgeReason::ContainerToPod => "Container → pod",
            EdgeReason::PodToContainer => "Pod → container",
        };
        write!(f, "{}", s)
    }
}

/// One edge in a bundle's debug/visualization graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleGraphEdge {
    pub from: String,
    pub to: String,
    pub reason: EdgeReason,
}

/// The subset of a unit's parsed directives needed to regenerate a
/// container spec. Absent from a bundle when the unit carries no
/// container payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleServiceTemplate {
    /// Owning unit's display name.
    pub name: String,
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub environment_files: Vec<String>,
    pub wanted_by: Vec<String>,
}

/// The top-level discovery aggregate: one logical deployable workload
/// inferred from units, containers and files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceBundle {
    /// Deterministic identity: `nodeName::derivedName`.
    pub id: String,
    pub display_name: String,
    pub node_name: String,
    pub severity: Severity,
    /// Human-readable summary strings (dependencies, pod membership, ports).
    pub hints: Vec<String>,
    pub validations: Vec<BundleValidation>,
    /// Member units.
    pub services: Vec<BundleServiceRef>,
    /// Deduplicated linked containers.
    pub containers: Vec<BundleContainerSummary>,
    /// Deduplicated published ports across all containers.
    pub ports: Vec<BundlePortSummary>,
    /// Deduplicated related files.
    pub assets: Vec<BundleAsset>,
    /// Debug graph of every discovered relationship.
    pub graph: Vec<BundleGraphEdge>,
    /// Normalized pod keys that justified grouping.
    pub pod_references: Vec<String>,
    /// Ordered discovery trace, for debugging only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discovery_log: Vec<String>,
    /// Regeneration templates for members with a container payload.
    pub templates: Vec<BundleServiceTemplate>,
}

impl ServiceBundle {
    /// Worst validation level present, mapped to a severity.
    pub fn computed_severity(&self) -> Severity {
        if self
            .validations
            .iter()
            .any(|v| v.level == ValidationLevel::Error)
        {
            Severity::Critical
        } else if self
            .validations
            .iter()
            .any(|v| v.level == ValidationLevel::Warning)
        {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}
