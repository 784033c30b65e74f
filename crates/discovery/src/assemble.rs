//! Per-root bundle assembly.
//!
//! One draft `ServiceBundle` is assembled for every unmanaged,
//! non-excluded root unit not already absorbed into an earlier bundle:
//! dependency walk, pod-membership expansion, container/asset collection,
//! hints and validations.

use crate::assets::resolve_assets;
use crate::graph::{collect_dependency_edges, has_dependency_cycle, walk_dependencies, UnitDeps};
use crate::podkey::{normalize_pod_key, PodKeyIndex, COMPOSE_PROJECT_LABELS};
use crate::DirectiveCache;
use podscout_bundle_schema::{
    BundleContainerSummary, BundleGraphEdge, BundlePortSummary, BundleServiceRef,
    BundleServiceTemplate, BundleValidation, EdgeReason, EnrichedContainer, QuadletDirectives,
    ServiceBundle, ServiceStatus, ServiceUnit, UnitSourceType, ValidationLevel, WatchedFile,
};
use podscout_common::naming::{sanitize_name, unit_display_name};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Unit directories whose names carry no workload identity.
const GENERIC_UNIT_DIRS: &[&str] = &["system", "systemd", "user", "etc", "containers"];

/// Per-node discovery inputs, indexed once per run.
pub struct NodeContext<'a> {
    pub node_name: &'a str,
    pub units_by_name: HashMap<String, &'a ServiceUnit>,
    pub containers_by_id: HashMap<String, &'a EnrichedContainer>,
    pub containers: &'a [EnrichedContainer],
    pub files: &'a BTreeMap<String, WatchedFile>,
    /// Authoritative directives per unit (re-parsed from captured content,
    /// else the collector's cached copy).
    pub directives: HashMap<String, QuadletDirectives>,
    /// Merged dependency edges per unit.
    pub deps: HashMap<String, UnitDeps>,
    /// Lines recorded while building the context, replayed into each
    /// bundle that touches the unit.
    pub unit_log: HashMap<String, Vec<String>>,
    pub pod_index: PodKeyIndex,
}

impl<'a> NodeContext<'a> {
    pub fn build(
        node_name: &'a str,
        services: &'a [ServiceUnit],
        containers: &'a [EnrichedContainer],
        files: &'a BTreeMap<String, WatchedFile>,
        cache: &mut DirectiveCache,
    ) -> Self {
        let mut directives: HashMap<String, QuadletDirectives> = HashMap::new();
        let mut unit_log: HashMap<String, Vec<String>> = HashMap::new();

        for unit in services {
            let path = unit.fragment_path.as_deref().or(unit.unit_path.as_deref());
            let reparsed = path.and_then(|p| cache.directives_for(p, files));
            match (reparsed, &unit.quadlet_directives) {
                (Some(parsed), cached) => {
                    if cached.as_ref().is_some_and(|c| *c != parsed) {
                        unit_log.entry(unit.name.clone()).or_default().push(format!(
                            "{}: re-parsed unit file replaced stale collector directives",
                            unit.name
                        ));
                    }
                    directives.insert(unit.name.clone(), parsed);
                }
                (None, Some(cached)) => {
                    directives.insert(unit.name.clone(), cached.clone());
                }
                (None, None) => {}
            }
        }

        let deps = services
            .iter()
            .map(|u| (u.name.clone(), UnitDeps::merge(u, directives.get(&u.name))))
            .collect();

        let directives_pods: HashMap<String, Vec<String>> = directives
            .iter()
            .map(|(name, d)| {
                (
                    name.clone(),
                    d.pod_signals().iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();
        let pod_index = PodKeyIndex::build(services, containers, &directives_pods);

        NodeContext {
            node_name,
            units_by_name: services.iter().map(|u| (u.name.clone(), u)).collect(),
            containers_by_id: containers.iter().map(|c| (c.id.clone(), c)).collect(),
            containers,
            files,
            directives,
            deps,
            unit_log,
            pod_index,
        }
    }
}

/// Units never picked as roots and never eligible for orphan synthesis:
/// the management tool's own units, the reverse proxy, and Podman itself.
pub fn is_excluded(unit: &ServiceUnit) -> bool {
    unit.is_agent
        || unit.is_reverse_proxy
        || matches!(unit.name.as_str(), "podman.service" | "podman.socket")
}

/// Assemble one draft bundle from a root unit and its expanded
/// neighborhood. Returns the bundle and its full member set.
pub fn assemble_bundle(
    ctx: &NodeContext<'_>,
    cache: &mut DirectiveCache,
    root: &str,
) -> (ServiceBundle, Vec<String>) {
    let mut bundle = ServiceBundle {
        node_name: ctx.node_name.to_string(),
        ..Default::default()
    };
    bundle
        .discovery_log
        .push(format!("{}: selected as unmanaged discovery root", root));

    // Dependency walk first, then pod-membership expansion over its result.
    let dep_members = walk_dependencies(root, &ctx.deps, &ctx.units_by_name);
    let expansion = ctx.pod_index.expand(&dep_members);
    let members = expansion.members.clone();
    if members.len() > dep_members.len() {
        bundle.discovery_log.push(format!(
            "pod membership expanded {} unit(s) to {}",
            dep_members.len(),
            members.len()
        ));
    }
    debug!(root, members = members.len(), "assembled neighborhood");

    for member in &members {
        let Some(unit) = ctx.units_by_name.get(member) else {
            continue;
        };
        let directives = ctx.directives.get(member);

        let mut discovery_hints = Vec::new();
        if member == root {
            discovery_hints.push("discovery root".to_string());
        } else if dep_members.contains(member) {
            discovery_hints.push(format!("reached via unit dependencies from {}", root));
        }
        if let Some(key) = expansion.via_key.get(member) {
            discovery_hints.push(format!("shares pod '{}'", key));
        }

        bundle.services.push(BundleServiceRef {
            name: unit.name.clone(),
            display_name: unit_display_name(&unit.name),
            status: if unit.is_managed {
                ServiceStatus::Managed
            } else {
                ServiceStatus::Unmanaged
            },
            unit_type: unit_type_of(unit, directives),
            unit_path: unit
                .fragment_path
                .clone()
                .or_else(|| unit.unit_path.clone()),
            discovery_hints,
        });

        if let Some(lines) = ctx.unit_log.get(member) {
            bundle.discovery_log.extend(lines.iter().cloned());
        }

        // Containers this unit is believed to control.
        for id in &unit.container_ids {
            let Some(container) = ctx.containers_by_id.get(id) else {
                continue;
            };
            let summary = summarize_container(container);
            push_edge(
                &mut bundle.graph,
                BundleGraphEdge {
                    from: unit.name.clone(),
                    to: summary.name.clone(),
                    reason: EdgeReason::SystemdToContainer,
                },
            );
            if let Some(ref pod_name) = container.pod_name {
                push_edge(
                    &mut bundle.graph,
                    BundleGraphEdge {
                        from: summary.name.clone(),
                        to: pod_name.clone(),
                        reason: EdgeReason::ContainerToPod,
                    },
                );
            }
            push_container(&mut bundle.containers, summary);
        }

        let resolved = resolve_assets(unit, ctx.files, cache);
        for asset in resolved.assets {
            if !bundle.assets.iter().any(|a| a.path == asset.path) {
                bundle.assets.push(asset);
            }
        }
        bundle.discovery_log.extend(resolved.log);

        if let Some(d) = directives {
            if d.has_container_payload() {
                push_template(
                    &mut bundle.templates,
                    BundleServiceTemplate {
                        name: unit_display_name(&unit.name),
                        image: d.image.clone(),
                        container_name: d.container_name.clone(),
                        environment: d.environment.clone(),
                        volumes: d.volumes.clone(),
                        environment_files: d.environment_files.clone(),
                        wanted_by: d.wanted_by.clone(),
                    },
                );
            }
        }
    }

    // Sibling containers that share a bundle pod without any unit
    // listing their id.
    for container in ctx.containers {
        let Some(ref pod_name) = container.pod_name else {
            continue;
        };
        let key = normalize_pod_key(pod_name);
        if !expansion.touched_keys.contains(&key) {
            continue;
        }
        let summary = summarize_container(container);
        push_edge(
            &mut bundle.graph,
            BundleGraphEdge {
                from: pod_name.clone(),
                to: summary.name.clone(),
                reason: EdgeReason::PodToContainer,
            },
        );
        push_container(&mut bundle.containers, summary);
    }

    // One debug edge per dependency directive with a known target.
    let dep_edges = collect_dependency_edges(&members, &ctx.deps, &ctx.units_by_name);
    if has_dependency_cycle(&members, &dep_edges) {
        bundle
            .discovery_log
            .push("dependency cycle among members".to_string());
    }
    for edge in dep_edges {
        push_edge(&mut bundle.graph, edge);
    }

    bundle.pod_references = expansion
        .touched_keys
        .iter()
        .map(|k| normalize_pod_key(k))
        .fold(Vec::new(), |mut acc, k| {
            if !k.is_empty() && !acc.contains(&k) {
                acc.push(k);
            }
            acc
        });

    let derived = derive_bundle_name(ctx, root, &members, &bundle);
    bundle.display_name = derived.clone();
    bundle.id = format!("{}::{}", ctx.node_name, derived);

    add_hints(&mut bundle, root, &members);
    recompute_ports(&mut bundle);
    apply_validations(&mut bundle);

    (bundle, members)
}

/// Display-ready projection of one running container.
pub fn summarize_container(container: &EnrichedContainer) -> BundleContainerSummary {
    BundleContainerSummary {
        id: container.id.clone(),
        name: container.display_name(),
        image: container.image.clone(),
        state: container.state.clone(),
        pod_name: container.pod_name.clone(),
        ports: container
            .ports
            .iter()
            .map(|p| BundlePortSummary {
                host_ip: p.host_ip.clone(),
                host_port: p.host_port,
                container_port: p.container_port,
                protocol: p.protocol.clone(),
            })
            .collect(),
    }
}

/// Derive the bundle's name: most common pod reference, else a compose
/// project label, else the anchor member's containing directory, else its
/// display name. The anchor is the lexicographically smallest member, so
/// the name never depends on which member seeded the walk.
fn derive_bundle_name(
    ctx: &NodeContext<'_>,
    root: &str,
    members: &[String],
    bundle: &ServiceBundle,
) -> String {
    // Most common pod key across members, lexicographic tie-break for
    // determinism.
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for member in members {
        for key in ctx.pod_index.keys_for(member) {
            *counts.entry(normalize_pod_key(key)).or_default() += 1;
        }
    }
    if let Some((key, _)) = counts
        .iter()
        .filter(|(k, _)| !k.is_empty())
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
    {
        return key.clone();
    }

    let mut projects: Vec<&String> = bundle
        .containers
        .iter()
        .filter_map(|c| ctx.containers_by_id.get(&c.id))
        .flat_map(|c| {
            COMPOSE_PROJECT_LABELS
                .iter()
                .filter_map(|label| c.labels.get(*label))
        })
        .collect();
    projects.sort();
    if let Some(project) = projects.first() {
        return sanitize_name(project);
    }

    let anchor = members
        .iter()
        .filter(|m| ctx.units_by_name.contains_key(*m))
        .min()
        .map(String::as_str)
        .unwrap_or(root);
    if let Some(dir) = ctx
        .units_by_name
        .get(anchor)
        .and_then(|u| u.fragment_path.as_deref().or(u.unit_path.as_deref()))
        .and_then(containing_dir_name)
    {
        return dir;
    }

    sanitize_name(&unit_display_name(anchor))
}

/// Last non-generic directory component of a path, sanitized.
fn containing_dir_name(path: &str) -> Option<String> {
    path.rsplit('/')
        .skip(1)
        .map(str::trim)
        .filter(|c| !c.is_empty() && !GENERIC_UNIT_DIRS.contains(&c.to_lowercase().as_str()))
        .map(sanitize_name)
        .find(|c| !c.is_empty())
}

fn unit_type_of(unit: &ServiceUnit, directives: Option<&QuadletDirectives>) -> UnitSourceType {
    if let Some(path) = unit.fragment_path.as_deref().or(unit.unit_path.as_deref()) {
        if path.ends_with(".container") {
            return UnitSourceType::Container;
        }
        if path.ends_with(".pod") {
            return UnitSourceType::Pod;
        }
        if path.ends_with(".kube") {
            return UnitSourceType::Kube;
        }
    }
    directives.map(|d| d.source_type).unwrap_or_default()
}

fn add_hints(bundle: &mut ServiceBundle, root: &str, members: &[String]) {
    if members.len() > 1 {
        bundle.hints.push(format!(
            "{} links {} related unit(s)",
            root,
            members.len() - 1
        ));
    }
    if let Some(pod) = bundle.pod_references.first() {
        let sharing = bundle
            .services
            .iter()
            .filter(|s| s.discovery_hints.iter().any(|h| h.contains("shares pod")))
            .count();
        if sharing > 0 {
            bundle
                .hints
                .push(format!("{} unit(s) joined via pod '{}'", sharing, pod));
        } else {
            bundle.hints.push(format!("pod '{}'", pod));
        }
    }
    if !bundle.ports.is_empty() {
        let ports: Vec<String> = bundle
            .ports
            .iter()
            .map(|p| format!("{}/{}", p.host_port, p.protocol))
            .collect();
        bundle
            .hints
            .push(format!("publishes host ports: {}", ports.join(", ")));
    }
}

/// Recompute the deduplicated published-port list from the container set.
pub fn recompute_ports(bundle: &mut ServiceBundle) {
    bundle.ports.clear();
    for container in &bundle.containers {
        for port in &container.ports {
            if !bundle.ports.contains(port) {
                bundle.ports.push(port.clone());
            }
        }
    }
}

/// Recompute validations and severity from the bundle's current content.
/// Validations are facts about the subject host, never engine failures.
pub fn apply_validations(bundle: &mut ServiceBundle) {
    bundle.validations.clear();

    if bundle.containers.is_empty() {
        bundle.validations.push(BundleValidation {
            level: ValidationLevel::Error,
            message: "no running containers linked".to_string(),
        });
    }

    let has_config = bundle.assets.iter().any(|a| {
        matches!(
            a.kind,
            podscout_bundle_schema::AssetKind::Kube
                | podscout_bundle_schema::AssetKind::Yaml
                | podscout_bundle_schema::AssetKind::Pod
        )
    });
    if !has_config {
        bundle.validations.push(BundleValidation {
            level: ValidationLevel::Warning,
            message: "no Quadlet/YAML configuration detected".to_string(),
        });
    }

    // One warning per host port published by more than one container.
    let mut publishers: BTreeMap<(u16, String), usize> = BTreeMap::new();
    for container in &bundle.containers {
        let mut seen: Vec<(u16, String)> = Vec::new();
        for port in &container.ports {
            let key = (port.host_port, port.protocol.clone());
            if !seen.contains(&key) {
                seen.push(key.clone());
                *publishers.entry(key).or_default() += 1;
            }
        }
    }
    for ((host_port, protocol), count) in publishers {
        if count > 1 {
            bundle.validations.push(BundleValidation {
                level: ValidationLevel::Warning,
                message: format!(
                    "host port {}/{} published by {} containers",
                    host_port, protocol, count
                ),
            });
        }
    }

    bundle.severity = bundle.computed_severity();
}

pub fn push_container(list: &mut Vec<BundleContainerSummary>, summary: BundleContainerSummary) {
    if !list.iter().any(|c| c.id == summary.id) {
        list.push(summary);
    }
}

pub fn push_edge(list: &mut Vec<BundleGraphEdge>, edge: BundleGraphEdge) {
    if !list.contains(&edge) {
        list.push(edge);
    }
}

/// Insert a template, merging field-wise with an existing same-named one
/// and preferring non-empty values.
pub fn push_template(list: &mut Vec<BundleServiceTemplate>, template: BundleServiceTemplate) {
    if let Some(existing) = list.iter_mut().find(|t| t.name == template.name) {
        if existing.image.is_none() {
            existing.image = template.image;
        }
        if existing.container_name.is_none() {
            existing.container_name = template.container_name;
        }
        for (k, v) in template.environment {
            existing.environment.entry(k).or_insert(v);
        }
        for volume in template.volumes {
            if !existing.volumes.contains(&volume) {
                existing.volumes.push(volume);
            }
        }
        for file in template.environment_files {
            if !existing.environment_files.contains(&file) {
                existing.environment_files.push(file);
            }
        }
        for target in template.wanted_by {
            if !existing.wanted_by.contains(&target) {
                existing.wanted_by.push(target);
            }
        }
    } else {
        list.push(template);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_excluded() {
        let mut unit = ServiceUnit {
            name: "web.service".to_string(),
            ..Default::default()
        };
        assert!(!is_excluded(&unit));
        unit.is_agent = true;
        assert!(is_excluded(&unit));

        let podman = ServiceUnit {
            name: "podman.socket".to_string(),
            ..Default::default()
        };
        assert!(is_excluded(&podman));
    }

    #[test]
    fn test_containing_dir_name_skips_generic_dirs() {
        assert_eq!(
            containing_dir_name("/opt/stacks/media/web.container"),
            Some("media".to_string())
        );
        assert_eq!(containing_dir_name("/etc/systemd/system/web.service"), None);
        assert_eq!(containing_dir_name("web.service"), None);
    }

    #[test]
    fn test_template_merge_prefers_non_empty() {
        let mut templates = Vec::new();
        push_template(
            &mut templates,
            BundleServiceTemplate {
                name: "web".to_string(),
                image: None,
                volumes: vec!["/a:/a".to_string()],
                ..Default::default()
            },
        );
        push_template(
            &mut templates,
            BundleServiceTemplate {
                name: "web".to_string(),
                image: Some("nginx".to_string()),
                volumes: vec!["/a:/a".to_string(), "/b:/b".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].image.as_deref(), Some("nginx"));
        assert_eq!(templates[0].volumes, vec!["/a:/a", "/b:/b"]);
    }

    #[test]
    fn test_port_conflict_validation() {
        let port = |host: u16| BundlePortSummary {
            host_ip: None,
            host_port: host,
            container_port: 80,
            protocol: "tcp".to_string(),
        };
        let container = |id: &str, ports: Vec<BundlePortSummary>| BundleContainerSummary {
            id: id.to_string(),
            name: id.to_string(),
            image: "nginx".to_string(),
            state: "running".to_string(),
            pod_name: None,
            ports,
        };

        let mut bundle = ServiceBundle {
            containers: vec![container("a", vec![port(8080)]), container("b", vec![port(8080)])],
            ..Default::default()
        };
        apply_validations(&mut bundle);
        assert!(bundle
            .validations
            .iter()
            .any(|v| v.level == ValidationLevel::Warning && v.message.contains("8080/tcp")));
    }
}
