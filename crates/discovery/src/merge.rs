//! Draft-bundle merging and orphan-pod synthesis.

use crate::assemble::{
    apply_validations, push_container, push_edge, push_template, recompute_ports,
    summarize_container, NodeContext,
};
use crate::podkey::normalize_pod_key;
use podscout_bundle_schema::{
    BundleGraphEdge, BundleServiceRef, BundleValidation, EdgeReason, EnrichedContainer,
    ServiceBundle, ServiceStatus, UnitSourceType, ValidationLevel,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Collapse draft bundles that share a pod identity into the first bundle
/// of each group. A draft whose keys hit several existing groups bridges
/// them: all matched groups collapse into the earliest one.
pub fn merge_bundles(drafts: Vec<ServiceBundle>) -> Vec<ServiceBundle> {
    let mut slots: Vec<Option<ServiceBundle>> = Vec::new();
    let mut key_to_idx: HashMap<String, usize> = HashMap::new();

    for bundle in drafts {
        let keys = bundle_pod_keys(&bundle);
        let mut hits: Vec<usize> = keys
            .iter()
            .filter_map(|k| key_to_idx.get(k).copied())
            .collect();
        hits.sort_unstable();
        hits.dedup();

        let Some(&target) = hits.first() else {
            let idx = slots.len();
            for key in &keys {
                key_to_idx.insert(key.clone(), idx);
            }
            slots.push(Some(bundle));
            continue;
        };

        let mut absorbed: Vec<ServiceBundle> = Vec::new();
        for &idx in &hits[1..] {
            absorbed.extend(slots[idx].take());
        }
        for idx in key_to_idx.values_mut() {
            if hits[1..].contains(idx) {
                *idx = target;
            }
        }
        if let Some(target_bundle) = slots[target].as_mut() {
            for other in absorbed {
                merge_into(target_bundle, other, "shared pod identity");
            }
            merge_into(target_bundle, bundle, "shared pod identity");
        }
        for key in keys {
            key_to_idx.insert(key, target);
        }
    }

    slots.into_iter().flatten().collect()
}

/// Every normalized pod key a bundle references: its own pod-reference
/// list, its containers' pod names, its container→pod debug edges, its
/// `.pod` asset basenames, and (as a last resort) its display name.
fn bundle_pod_keys(bundle: &ServiceBundle) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();

    for reference in &bundle.pod_references {
        push_key(&mut keys, normalize_pod_key(reference));
    }
    for container in &bundle.containers {
        if let Some(ref pod_name) = container.pod_name {
            push_key(&mut keys, normalize_pod_key(pod_name));
        }
    }
    for edge in &bundle.graph {
        if edge.reason == EdgeReason::ContainerToPod {
            push_key(&mut keys, normalize_pod_key(&edge.to));
        }
    }
    for asset in &bundle.assets {
        if let Some(stem) = asset.path.rsplit('/').next().and_then(|f| f.strip_suffix(".pod")) {
            push_key(&mut keys, normalize_pod_key(stem));
        }
    }
    if keys.is_empty() {
        push_key(&mut keys, normalize_pod_key(&bundle.display_name));
    }
    keys
}

fn push_key(keys: &mut Vec<String>, key: String) {
    if !key.is_empty() && !keys.contains(&key) {
        keys.push(key);
    }
}

/// Merge `other` into `target`: concatenate then dedup every list, then
/// recompute ports, validations and severity on the result.
pub(crate) fn merge_into(target: &mut ServiceBundle, other: ServiceBundle, note: &str) {
    debug!(target = %target.id, absorbed = %other.id, note, "merging bundles");
    target
        .discovery_log
        .push(format!("merged '{}' ({})", other.id, note));

    for service in other.services {
        if !target.services.iter().any(|s| s.name == service.name) {
            target.services.push(service);
        }
    }
    for container in other.containers {
        push_container(&mut target.containers, container);
    }
    for asset in other.assets {
        if !target.assets.iter().any(|a| a.path == asset.path) {
            target.assets.push(asset);
        }
    }
    for edge in other.graph {
        push_edge(&mut target.graph, edge);
    }
    for hint in other.hints {
        if !target.hints.contains(&hint) {
            target.hints.push(hint);
        }
    }
    for template in other.templates {
        push_template(&mut target.templates, template);
    }
    for reference in other.pod_references {
        if !target.pod_references.contains(&reference) {
            target.pod_references.push(reference);
        }
    }
    target.discovery_log.extend(other.discovery_log);

    recompute_ports(target);
    apply_validations(target);
}

/// Synthesize a bundle for every pod that has running containers but no
/// unit anywhere claiming membership. A claim by any unit counts, managed
/// or not, so the management stack's own pods are never
/// re-surfaced here.
pub fn synthesize_orphan_bundles(ctx: &NodeContext<'_>) -> Vec<ServiceBundle> {
    let mut by_pod: BTreeMap<String, Vec<&EnrichedContainer>> = BTreeMap::new();
    for container in ctx.containers {
        let Some(ref pod_name) = container.pod_name else {
            continue;
        };
        if ctx.pod_index.is_claimed(pod_name) {
            continue;
        }
        let key = normalize_pod_key(pod_name);
        if key.is_empty() {
            continue;
        }
        by_pod.entry(key).or_default().push(container);
    }

    let mut bundles = Vec::new();
    for (key, containers) in by_pod {
        debug!(pod = %key, containers = containers.len(), "synthesizing orphan-pod bundle");
        let pod_name = containers[0].pod_name.clone().unwrap_or_else(|| key.clone());

        let mut bundle = ServiceBundle {
            id: format!("{}::{}", ctx.node_name, key),
            display_name: key.clone(),
            node_name: ctx.node_name.to_string(),
            pod_references: vec![key.clone()],
            services: vec![BundleServiceRef {
                name: format!("{}.pod", key),
                display_name: key.clone(),
                status: ServiceStatus::Unmanaged,
                unit_type: UnitSourceType::Pod,
                unit_path: None,
                discovery_hints: vec![
                    "synthesized from running containers; no unit claims this pod".to_string(),
                ],
            }],
            ..Default::default()
        };
        bundle.discovery_log.push(format!(
            "pod '{}': no managing unit found, bundle synthesized from container evidence",
            pod_name
        ));

        for container in containers {
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

        recompute_ports(&mut bundle);
        apply_validations(&mut bundle);
        bundle.validations.push(BundleValidation {
            level: ValidationLevel::Warning,
            message: "no managing service controls this pod".to_string(),
        });
        bundle.severity = bundle.computed_severity();

        bundles.push(bundle);
    }

    bundles
}

#[cfg(test)]
mod tests {
    use super::*;
    use podscout_bundle_schema::{AssetKind, BundleAsset};
    use pretty_assertions::assert_eq;

    fn draft(id: &str, pod_references: &[&str]) -> ServiceBundle {
        ServiceBundle {
            id: id.to_string(),
            display_name: id.to_string(),
            pod_references: pod_references.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bundles_sharing_a_pod_merge_into_the_first() {
        let mut a = draft("node::a", &["shared"]);
        a.services.push(BundleServiceRef {
            name: "a.service".to_string(),
            display_name: "a".to_string(),
            status: ServiceStatus::Unmanaged,
            unit_type: UnitSourceType::Container,
            unit_path: None,
            discovery_hints: vec![],
        });
        let mut b = draft("node::b", &["shared"]);
        b.services.push(BundleServiceRef {
            name: "b.service".to_string(),
            display_name: "b".to_string(),
            status: ServiceStatus::Unmanaged,
            unit_type: UnitSourceType::Container,
            unit_path: None,
            discovery_hints: vec![],
        });
        let c = draft("node::c", &["other"]);

        let merged = merge_bundles(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "node::a");
        let names: Vec<&str> = merged[0].services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.service", "b.service"]);
    }

    #[test]
    fn test_bridging_draft_collapses_both_groups() {
        // c carries both keys and must pull the two earlier groups into one.
        let a = draft("node::a", &["p"]);
        let b = draft("node::b", &["q"]);
        let c = draft("node::c", &["p", "q"]);

        let merged = merge_bundles(vec![a, b, c]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "node::a");
    }

    #[test]
    fn test_display_name_is_last_resort_key() {
        // No pod signal anywhere: grouping falls back to the display name.
        let a = draft("web", &[]);
        let b = draft("web", &[]);
        let c = draft("db", &[]);

        let merged = merge_bundles(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_pod_asset_basename_joins_groups() {
        let mut a = draft("node::a", &["web"]);
        a.assets.push(BundleAsset {
            path: "/etc/containers/systemd/web.pod".to_string(),
            kind: AssetKind::Pod,
            modified_at: None,
        });
        // b carries no pod reference of its own but owns the same .pod file.
        let mut b = draft("node::b", &[]);
        b.assets.push(BundleAsset {
            path: "/etc/containers/systemd/web.pod".to_string(),
            kind: AssetKind::Pod,
            modified_at: None,
        });

        let merged = merge_bundles(vec![a, b]);
        assert_eq!(merged.len(), 1);
    }
}
