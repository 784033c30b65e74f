//! Stack artifact types - the output of synthesis.

use serde::{Deserialize, Serialize};

/// The synthesized, re-deployable definition of one bundle: a Quadlet-style
/// `.kube` unit body paired with a Pod specification document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStackArtifacts {
    /// Safe stack name used for file names and the pod name.
    pub stack_name: String,
    /// Unit-file body declaring `Yaml=<stack_name>.yml`.
    pub kube_unit: String,
    /// Pod specification document (apiVersion v1, kind Pod).
    pub pod_yaml: String,
    /// Flattened view of every container in the pod spec.
    pub containers: Vec<StackContainer>,
    /// Config/`.env` paths referenced by the stack.
    pub env_files: Vec<String>,
}

/// One container entry in the synthesized pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackContainer {
    pub name: String,
    pub image: String,
    pub role: ContainerRole,
}

/// Position of a container within the synthesized pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRole {
    /// First container in the pod spec.
    Primary,
    /// Every container after the first.
    Sidecar,
}

/// A parsed `Volume=` directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}
