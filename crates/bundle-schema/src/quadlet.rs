//! Parsed unit-file directive model.

use crate::snapshot::PublishedPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of unit file a set of directives came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSourceType {
    Container,
    Pod,
    Kube,
    #[default]
    Service,
}

impl std::fmt::Display for UnitSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitSourceType::Container => "container",
            UnitSourceType::Pod => "pod",
            UnitSourceType::Kube => "kube",
            UnitSourceType::Service => "service",
        };
        write!(f, "{}", s)
    }
}

/// The typed form of one unit file.
///
/// Directive lists accumulate across repeated same-named keys (a second
/// `Requires=` line appends, it does not overwrite) with duplicates
/// suppressed and insertion order preserved. `environment` is keyed by
/// variable name; later same-key occurrences overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuadletDirectives {
    /// `[Unit] Requires=`, entries normalized to end in `.service`.
    pub requires: Vec<String>,
    /// `[Unit] After=`, entries normalized to end in `.service`.
    pub after: Vec<String>,
    /// `[Unit] Wants=`, entries normalized to end in `.service`.
    pub wants: Vec<String>,
    /// `[Unit] BindsTo=`, entries normalized to end in `.service`.
    pub binds_to: Vec<String>,

    /// `[Container] ContainerName=`.
    pub container_name: Option<String>,
    /// `[Container] Image=`.
    pub image: Option<String>,
    /// `[Container] Environment=KEY=VALUE` entries.
    pub environment: BTreeMap<String, String>,
    /// `[Container] Volume=` entries, raw (parsed at synthesis time).
    pub volumes: Vec<String>,
    /// `[Container] EnvironmentFile=` paths.
    pub environment_files: Vec<String>,
    /// `[Container] Pod=` join reference, trailing `.pod` stripped.
    pub pod: Option<String>,

    /// `[Pod] PodName=`.
    pub pod_name: Option<String>,
    /// `PublishPort=` entries from `[Pod]` or `[Container]`.
    pub publish_ports: Vec<PublishedPort>,

    /// `[Kube] Yaml=` path.
    pub yaml: Option<String>,
    /// `[Kube] AutoUpdate=` policy.
    pub auto_update: Option<String>,

    /// `[Install] WantedBy=` targets (not `.service`-suffixed).
    pub wanted_by: Vec<String>,
    /// `[Install] RequiredBy=` targets (not `.service`-suffixed).
    pub required_by: Vec<String>,

    /// Which unit-file flavor the directives came from.
    pub source_type: UnitSourceType,
}

impl QuadletDirectives {
    /// True when the file carries a container payload worth templating.
    pub fn has_container_payload(&self) -> bool {
        self.image.is_some()
            || self.container_name.is_some()
            || !self.environment.is_empty()
            || !self.volumes.is_empty()
            || !self.environment_files.is_empty()
    }

    /// All pod signals carried by these directives.
    pub fn pod_signals(&self) -> Vec<&str> {
        let mut signals = Vec::new();
        if let Some(ref pod) = self.pod {
            signals.push(pod.as_str());
        }
        if let Some(ref name) = self.pod_name {
            signals.push(name.as_str());
        }
        signals
    }
}
