//! Stack artifact synthesis: bundle → Pod specification + Quadlet unit.
//!
//! The generator is complete rather than faithful: every unit the bundle
//! references ends up as a container entry (live image, template image or
//! placeholder), so no discovered relationship is silently dropped from
//! the synthesized artifact.

use podscout_bundle_schema::{
    BundleContainerSummary, BundleServiceTemplate, BundleStackArtifacts, ContainerRole,
    EdgeReason, ServiceBundle, StackContainer, VolumeMount,
};
use podscout_common::naming::{sanitize_name, unique_name};
use podscout_common::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Image used when neither a live container nor a template names one.
const PLACEHOLDER_IMAGE: &str = "localhost/placeholder:latest";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodDocument {
    api_version: String,
    kind: String,
    metadata: PodMetadata,
    spec: PodSpec,
}

#[derive(Serialize)]
struct PodMetadata {
    name: String,
    labels: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct PodSpec {
    containers: Vec<PodContainer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<PodVolume>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodContainer {
    name: String,
    image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<PodContainerPort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<PodEnvVar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env_from: Vec<PodEnvFromSource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volume_mounts: Vec<PodVolumeMount>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodContainerPort {
    container_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_ip: Option<String>,
    protocol: String,
}

#[derive(Serialize)]
struct PodEnvVar {
    name: String,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodEnvFromSource {
    config_map_ref: PodConfigMapRef,
}

#[derive(Serialize)]
struct PodConfigMapRef {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodVolumeMount {
    name: String,
    mount_path: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    read_only: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodVolume {
    name: String,
    host_path: PodHostPath,
}

#[derive(Serialize)]
struct PodHostPath {
    path: String,
}

/// Parse one `Volume=` directive. Accepts `key=value,...` (keys:
/// source/src/host/hostpath, destination/dest/target/container/dir/
/// containerpath, options/mode, readonly) and colon-delimited
/// `host:container[:options]`.
pub fn parse_volume(raw: &str) -> Option<VolumeMount> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.contains('=') {
        let mut mount = VolumeMount::default();
        for pair in raw.split(',') {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k.trim().to_lowercase(), v.trim()),
                None => (String::from("readonly"), pair.trim()),
            };
            match key.as_str() {
                "source" | "src" | "host" | "hostpath" => mount.host_path = value.to_string(),
                "destination" | "dest" | "target" | "container" | "dir" | "containerpath" => {
                    mount.container_path = value.to_string()
                }
                "options" | "mode" => {
                    mount.read_only = value.split(',').any(|o| o.trim() == "ro");
                }
                "readonly" => {
                    mount.read_only =
                        value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("ro");
                }
                _ => {}
            }
        }
        if mount.host_path.is_empty() || mount.container_path.is_empty() {
            return None;
        }
        return Some(mount);
    }

    let parts: Vec<&str> = raw.splitn(3, ':').collect();
    match parts.as_slice() {
        [host, container] => Some(VolumeMount {
            host_path: host.to_string(),
            container_path: container.to_string(),
            read_only: false,
        }),
        [host, container, options] => Some(VolumeMount {
            host_path: host.to_string(),
            container_path: container.to_string(),
            read_only: options.split(',').any(|o| o.trim() == "ro"),
        }),
        _ => None,
    }
}

/// Synthesize the deployable artifact pair for one bundle.
pub fn generate_stack_artifacts(
    bundle: &ServiceBundle,
    target_name: Option<&str>,
) -> Result<BundleStackArtifacts> {
    let stack_name = {
        let raw = target_name.unwrap_or(&bundle.display_name);
        let name = sanitize_name(raw);
        if name.is_empty() {
            "stack".to_string()
        } else {
            name
        }
    };

    let mut builder = SpecBuilder::default();

    // Live containers first, enriched by a matching template when one
    // exists.
    let mut used_templates: HashSet<String> = HashSet::new();
    for container in &bundle.containers {
        let template = template_for_container(bundle, container);
        if let Some(t) = template {
            used_templates.insert(t.name.clone());
        }
        builder.add_live(container, template);
    }

    // Templates with no live container still describe a container.
    for template in &bundle.templates {
        if !used_templates.contains(&template.name) {
            builder.add_template(template);
        }
    }

    // Units that produced neither a live container nor a template get a
    // bare placeholder so the synthesized pod stays structurally complete.
    let covered: HashSet<&str> = bundle
        .graph
        .iter()
        .filter(|e| e.reason == EdgeReason::SystemdToContainer)
        .map(|e| e.from.as_str())
        .collect();
    for service in &bundle.services {
        if covered.contains(service.name.as_str()) {
            continue;
        }
        if bundle.templates.iter().any(|t| t.name == service.display_name) {
            continue;
        }
        builder.add_placeholder(&service.display_name);
    }

    let containers: Vec<StackContainer> = builder
        .specs
        .iter()
        .enumerate()
        .map(|(i, spec)| StackContainer {
            name: spec.name.clone(),
            image: spec.image.clone(),
            role: if i == 0 {
                ContainerRole::Primary
            } else {
                ContainerRole::Sidecar
            },
        })
        .collect();

    let document = PodDocument {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        metadata: PodMetadata {
            name: stack_name.clone(),
            labels: [("app".to_string(), stack_name.clone())].into(),
        },
        spec: PodSpec {
            containers: builder.specs,
            volumes: builder.volumes,
        },
    };
    let pod_yaml = serde_yaml::to_string(&document)?;

    let kube_unit = render_kube_unit(bundle, &stack_name);

    Ok(BundleStackArtifacts {
        stack_name,
        kube_unit,
        pod_yaml,
        containers,
        env_files: builder.env_files,
    })
}

/// Human-readable concatenation of the two artifacts, with filename
/// headers, suitable for direct display.
pub fn generate_stack_preview(bundle: &ServiceBundle, target_name: Option<&str>) -> Result<String> {
    let artifacts = generate_stack_artifacts(bundle, target_name)?;
    Ok(format!(
        "# {name}.kube\n{unit}\n# {name}.yml\n{yaml}",
        name = artifacts.stack_name,
        unit = artifacts.kube_unit,
        yaml = artifacts.pod_yaml,
    ))
}

#[derive(Default)]
struct SpecBuilder {
    specs: Vec<PodContainer>,
    volumes: Vec<PodVolume>,
    env_files: Vec<String>,
    taken_names: HashSet<String>,
    taken_volume_names: HashSet<String>,
    taken_configmap_names: HashSet<String>,
    /// host path → generated volume name, so multiple mounts of one host
    /// path share one volume.
    volume_by_host: BTreeMap<String, String>,
}

impl SpecBuilder {
    fn add_live(
        &mut self,
        container: &BundleContainerSummary,
        template: Option<&BundleServiceTemplate>,
    ) {
        let name = self.reserve_name(&container.name, "container");
        let image = if !container.image.is_empty() {
            container.image.clone()
        } else {
            template
                .and_then(|t| t.image.clone())
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
        };

        let ports = container
            .ports
            .iter()
            .map(|p| PodContainerPort {
                container_port: p.container_port,
                host_port: Some(p.host_port),
                host_ip: p.host_ip.clone(),
                protocol: p.protocol.to_uppercase(),
            })
            .collect();

        let (env, env_from, volume_mounts) = match template {
            Some(t) => self.payload_from_template(t),
            None => (Vec::new(), Vec::new(), Vec::new()),
        };

        self.specs.push(PodContainer {
            name,
            image,
            ports,
            env,
            env_from,
            volume_mounts,
        });
    }

    fn add_template(&mut self, template: &BundleServiceTemplate) {
        let raw_name = template
            .container_name
            .as_deref()
            .unwrap_or(&template.name);
        let name = self.reserve_name(raw_name, "container");
        let image = template
            .image
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());
        let (env, env_from, volume_mounts) = self.payload_from_template(template);

        self.specs.push(PodContainer {
            name,
            image,
            ports: Vec::new(),
            env,
            env_from,
            volume_mounts,
        });
    }

    fn add_placeholder(&mut self, display_name: &str) {
        let name = self.reserve_name(display_name, "service");
        self.specs.push(PodContainer {
            name,
            image: PLACEHOLDER_IMAGE.to_string(),
            ports: Vec::new(),
            env: Vec::new(),
            env_from: Vec::new(),
            volume_mounts: Vec::new(),
        });
    }

    fn payload_from_template(
        &mut self,
        template: &BundleServiceTemplate,
    ) -> (Vec<PodEnvVar>, Vec<PodEnvFromSource>, Vec<PodVolumeMount>) {
        let env = template
            .environment
            .iter()
            .map(|(name, value)| PodEnvVar {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();

        let mut env_from = Vec::new();
        for path in &template.environment_files {
            if !self.env_files.contains(path) {
                self.env_files.push(path.clone());
            }
            let stem = path
                .rsplit('/')
                .next()
                .and_then(|f| f.rsplit_once('.').map(|(s, _)| s).or(Some(f)))
                .unwrap_or("env");
            let candidate = {
                let s = sanitize_name(stem);
                if s.is_empty() {
                    "env".to_string()
                } else {
                    s
                }
            };
            let name = unique_name(&candidate, &mut self.taken_configmap_names);
            env_from.push(PodEnvFromSource {
                config_map_ref: PodConfigMapRef { name },
            });
        }

        let mut volume_mounts: Vec<PodVolumeMount> = Vec::new();
        for raw in &template.volumes {
            let Some(mount) = parse_volume(raw) else {
                continue;
            };
            let volume_name = match self.volume_by_host.get(&mount.host_path) {
                Some(name) => name.clone(),
                None => {
                    let candidate = {
                        let base = mount.host_path.rsplit('/').next().unwrap_or("");
                        let s = sanitize_name(base);
                        if s.is_empty() {
                            "data".to_string()
                        } else {
                            s
                        }
                    };
                    let name = unique_name(&candidate, &mut self.taken_volume_names);
                    self.volume_by_host
                        .insert(mount.host_path.clone(), name.clone());
                    self.volumes.push(PodVolume {
                        name: name.clone(),
                        host_path: PodHostPath {
                            path: mount.host_path.clone(),
                        },
                    });
                    name
                }
            };
            if !volume_mounts
                .iter()
                .any(|m| m.mount_path == mount.container_path)
            {
                volume_mounts.push(PodVolumeMount {
                    name: volume_name,
                    mount_path: mount.container_path,
                    read_only: mount.read_only,
                });
            }
        }

        (env, env_from, volume_mounts)
    }

    fn reserve_name(&mut self, raw: &str, fallback: &str) -> String {
        let candidate = {
            let s = sanitize_name(raw);
            if s.is_empty() {
                fallback.to_string()
            } else {
                s
            }
        };
        unique_name(&candidate, &mut self.taken_names)
    }
}

fn template_for_container<'a>(
    bundle: &'a ServiceBundle,
    container: &BundleContainerSummary,
) -> Option<&'a BundleServiceTemplate> {
    bundle.templates.iter().find(|t| {
        t.container_name.as_deref() == Some(container.name.as_str())
            || t.name == container.name
            || t.name == sanitize_name(&container.name)
    })
}

fn render_kube_unit(bundle: &ServiceBundle, stack_name: &str) -> String {
    let mut unit = String::new();
    unit.push_str("[Unit]\n");
    unit.push_str(&format!("Description=Synthesized stack for {}\n", stack_name));
    unit.push('\n');
    unit.push_str("[Kube]\n");
    unit.push_str(&format!("Yaml={}.yml\n", stack_name));
    unit.push_str("AutoUpdate=registry\n");
    unit.push('\n');
    unit.push_str("[Install]\n");

    let mut targets: Vec<&str> = Vec::new();
    for template in &bundle.templates {
        for target in &template.wanted_by {
            if !targets.contains(&target.as_str()) {
                targets.push(target);
            }
        }
    }
    if targets.is_empty() {
        targets.push("default.target");
    }
    unit.push_str(&format!("WantedBy={}\n", targets.join(" ")));

    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use podscout_bundle_schema::{
        BundleGraphEdge, BundlePortSummary, BundleServiceRef, ServiceStatus, UnitSourceType,
    };
    use pretty_assertions::assert_eq;

    fn service(name: &str) -> BundleServiceRef {
        BundleServiceRef {
            name: format!("{}.service", name),
            display_name: name.to_string(),
            status: ServiceStatus::Unmanaged,
            unit_type: UnitSourceType::Container,
            unit_path: None,
            discovery_hints: vec![],
        }
    }

    #[test]
    fn test_parse_volume_round_trip() {
        let expected = VolumeMount {
            host_path: "/data".to_string(),
            container_path: "/app/data".to_string(),
            read_only: true,
        };
        assert_eq!(parse_volume("/data:/app/data:ro"), Some(expected.clone()));
        assert_eq!(
            parse_volume("source=/data,destination=/app/data,options=ro"),
            Some(expected)
        );
        assert_eq!(
            parse_volume("/data:/app/data"),
            Some(VolumeMount {
                host_path: "/data".to_string(),
                container_path: "/app/data".to_string(),
                read_only: false,
            })
        );
        assert_eq!(parse_volume("just-a-name"), None);
        assert_eq!(parse_volume(""), None);
    }

    #[test]
    fn test_synthesis_covers_every_service() {
        // Three member services: one with a live container, one with a
        // template, one with neither.
        let bundle = ServiceBundle {
            display_name: "web".to_string(),
            services: vec![service("alpha"), service("beta"), service("gamma")],
            containers: vec![BundleContainerSummary {
                id: "c1".to_string(),
                name: "alpha-1".to_string(),
                image: "docker.io/library/nginx:1.25".to_string(),
                state: "running".to_string(),
                pod_name: None,
                ports: vec![BundlePortSummary {
                    host_ip: None,
                    host_port: 8080,
                    container_port: 80,
                    protocol: "tcp".to_string(),
                }],
            }],
            graph: vec![BundleGraphEdge {
                from: "alpha.service".to_string(),
                to: "alpha-1".to_string(),
                reason: EdgeReason::SystemdToContainer,
            }],
            templates: vec![BundleServiceTemplate {
                name: "beta".to_string(),
                image: Some("docker.io/library/redis:7".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let artifacts = generate_stack_artifacts(&bundle, None).unwrap();
        assert_eq!(artifacts.containers.len(), 3);
        assert_eq!(artifacts.containers[0].role, ContainerRole::Primary);
        assert_eq!(artifacts.containers[1].role, ContainerRole::Sidecar);
        let gamma = artifacts
            .containers
            .iter()
            .find(|c| c.name == "gamma")
            .expect("placeholder for the bare service");
        assert_eq!(gamma.image, PLACEHOLDER_IMAGE);

        assert!(artifacts.pod_yaml.contains("apiVersion: v1"));
        assert!(artifacts.pod_yaml.contains("kind: Pod"));
        assert!(artifacts.kube_unit.contains("Yaml=web.yml"));
        assert!(artifacts.kube_unit.contains("AutoUpdate=registry"));
    }

    #[test]
    fn test_name_collisions_get_suffix_counters() {
        let container = |id: &str| BundleContainerSummary {
            id: id.to_string(),
            name: "web".to_string(),
            image: "nginx".to_string(),
            state: "running".to_string(),
            pod_name: None,
            ports: vec![],
        };
        let bundle = ServiceBundle {
            display_name: "web".to_string(),
            containers: vec![container("a"), container("b"), container("c")],
            ..Default::default()
        };

        let artifacts = generate_stack_artifacts(&bundle, None).unwrap();
        let names: Vec<&str> = artifacts.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["web", "web-2", "web-3"]);
    }

    #[test]
    fn test_shared_host_path_shares_one_volume() {
        let bundle = ServiceBundle {
            display_name: "web".to_string(),
            templates: vec![
                BundleServiceTemplate {
                    name: "alpha".to_string(),
                    image: Some("nginx".to_string()),
                    volumes: vec!["/srv/data:/var/www:ro".to_string()],
                    ..Default::default()
                },
                BundleServiceTemplate {
                    name: "beta".to_string(),
                    image: Some("redis".to_string()),
                    volumes: vec!["source=/srv/data,destination=/cache".to_string()],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let artifacts = generate_stack_artifacts(&bundle, None).unwrap();
        // One generated volume, mounted twice.
        let volume_lines = artifacts
            .pod_yaml
            .lines()
            .filter(|l| l.trim_start().starts_with("path: /srv/data"))
            .count();
        assert_eq!(volume_lines, 1);
    }

    #[test]
    fn test_target_name_overrides_display_name() {
        let bundle = ServiceBundle {
            display_name: "web".to_string(),
            ..Default::default()
        };
        let artifacts = generate_stack_artifacts(&bundle, Some("My Stack!")).unwrap();
        assert_eq!(artifacts.stack_name, "my-stack");
        assert!(artifacts.kube_unit.contains("Yaml=my-stack.yml"));
    }
}
