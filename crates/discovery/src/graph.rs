//! Dependency walking over unit ordering/grouping directives.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use podscout_bundle_schema::{BundleGraphEdge, EdgeReason, QuadletDirectives, ServiceUnit};
use std::collections::HashMap;

/// The merged dependency edges of one unit: the union of the collector's
/// ordered lists and the unit's authoritatively parsed directives.
#[derive(Debug, Clone, Default)]
pub struct UnitDeps {
    pub requires: Vec<String>,
    pub after: Vec<String>,
    pub wants: Vec<String>,
    pub binds_to: Vec<String>,
}

impl UnitDeps {
    pub fn merge(unit: &ServiceUnit, directives: Option<&QuadletDirectives>) -> Self {
        let mut deps = UnitDeps {
            requires: unit.requires.clone(),
            after: unit.after.clone(),
            wants: unit.wants.clone(),
            binds_to: unit.binds_to.clone(),
        };
        if let Some(d) = directives {
            extend_unique(&mut deps.requires, &d.requires);
            extend_unique(&mut deps.after, &d.after);
            extend_unique(&mut deps.wants, &d.wants);
            extend_unique(&mut deps.binds_to, &d.binds_to);
        }
        deps
    }
}

fn extend_unique(list: &mut Vec<String>, entries: &[String]) {
    for entry in entries {
        if !list.contains(entry) {
            list.push(entry.clone());
        }
    }
}

/// Resolve a dependency target to a known unit name. Targets usually
/// arrive `.service`-suffixed already; a bare name is retried with the
/// suffix appended.
pub fn resolve_unit_name(target: &str, units: &HashMap<String, &ServiceUnit>) -> Option<String> {
    if units.contains_key(target) {
        return Some(target.to_string());
    }
    if !target.ends_with(".service") {
        let suffixed = format!("{}.service", target);
        if units.contains_key(&suffixed) {
            return Some(suffixed);
        }
    }
    None
}

/// Depth-first transitive closure starting at `root`, following
/// `Requires`, `After` and `Wants` edges among known units in both
/// directions, so every unit of a dependency component lands in the same
/// neighborhood no matter which member seeded the walk.
///
/// `BindsTo` is deliberately not followed: it is recorded in the debug
/// graph but never pulls in new members, mirroring the asymmetric trust
/// systemd places in these directives for ordering vs. grouping. The
/// `visited` set is the cycle-breaker: a unit reached twice is never
/// re-expanded.
pub fn walk_dependencies(
    root: &str,
    deps: &HashMap<String, UnitDeps>,
    units: &HashMap<String, &ServiceUnit>,
) -> Vec<String> {
    let mut visited: Vec<String> = Vec::new();
    let mut stack: Vec<String> = vec![root.to_string()];

    while let Some(name) = stack.pop() {
        if visited.contains(&name) {
            continue;
        }
        visited.push(name.clone());

        let mut resolved: Vec<String> = Vec::new();
        if let Some(unit_deps) = deps.get(&name) {
            let targets = unit_deps
                .requires
                .iter()
                .chain(&unit_deps.after)
                .chain(&unit_deps.wants);
            for target in targets {
                if let Some(t) = resolve_unit_name(target, units) {
                    if !visited.contains(&t) && !resolved.contains(&t) {
                        resolved.push(t);
                    }
                }
            }
        }

        // Reverse edges: units pointing at this one. Sorted, so the
        // expansion order never depends on map iteration order.
        let mut inbound: Vec<String> = Vec::new();
        for (other, other_deps) in deps {
            if other == &name
                || !units.contains_key(other)
                || visited.contains(other)
                || resolved.contains(other)
            {
                continue;
            }
            let points_here = other_deps
                .requires
                .iter()
                .chain(&other_deps.after)
                .chain(&other_deps.wants)
                .filter_map(|t| resolve_unit_name(t, units))
                .any(|t| t == name);
            if points_here {
                inbound.push(other.clone());
            }
        }
        inbound.sort_unstable();
        resolved.extend(inbound);

        // Reverse keeps expansion in declaration order on the LIFO stack.
        resolved.reverse();
        stack.extend(resolved);
    }

    visited
}

/// One debug edge per discovered dependency directive whose target is a
/// known unit, for every member. Includes `BindsTo`, which the walker
/// itself ignores.
pub fn collect_dependency_edges(
    members: &[String],
    deps: &HashMap<String, UnitDeps>,
    units: &HashMap<String, &ServiceUnit>,
) -> Vec<BundleGraphEdge> {
    let mut edges = Vec::new();
    for member in members {
        let Some(unit_deps) = deps.get(member) else {
            continue;
        };
        let reasons = [
            (&unit_deps.requires, EdgeReason::Requires),
            (&unit_deps.after, EdgeReason::After),
            (&unit_deps.wants, EdgeReason::Wants),
            (&unit_deps.binds_to, EdgeReason::BindsTo),
        ];
        for (targets, reason) in reasons {
            for target in targets.iter() {
                if let Some(resolved) = resolve_unit_name(target, units) {
                    let edge = BundleGraphEdge {
                        from: member.clone(),
                        to: resolved,
                        reason,
                    };
                    if !edges.contains(&edge) {
                        edges.push(edge);
                    }
                }
            }
        }
    }
    edges
}

/// True when the members' dependency edges form a cycle. Surfaced as a
/// discovery-log line, never an error.
pub fn has_dependency_cycle(members: &[String], edges: &[BundleGraphEdge]) -> bool {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut node_map: HashMap<&str, NodeIndex> = HashMap::new();

    for member in members {
        let idx = graph.add_node(member.as_str());
        node_map.insert(member.as_str(), idx);
    }
    for edge in edges {
        if let (Some(&from), Some(&to)) = (
            node_map.get(edge.from.as_str()),
            node_map.get(edge.to.as_str()),
        ) {
            graph.add_edge(from, to, ());
        }
    }

    toposort(&graph, None).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit(name: &str) -> ServiceUnit {
        ServiceUnit {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn deps_of(pairs: &[(&str, &[&str])]) -> HashMap<String, UnitDeps> {
        pairs
            .iter()
            .map(|(name, requires)| {
                (
                    name.to_string(),
                    UnitDeps {
                        requires: requires.iter().map(|s| s.to_string()).collect(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_walk_terminates_on_cycle_with_both_units_once() {
        let a = unit("a.service");
        let b = unit("b.service");
        let units: HashMap<String, &ServiceUnit> = [
            ("a.service".to_string(), &a),
            ("b.service".to_string(), &b),
        ]
        .into();
        let deps = deps_of(&[
            ("a.service", &["b.service"]),
            ("b.service", &["a.service"]),
        ]);

        let members = walk_dependencies("a.service", &deps, &units);
        assert_eq!(members, vec!["a.service".to_string(), "b.service".to_string()]);
    }

    #[test]
    fn test_walk_follows_edges_in_both_directions() {
        // b declares nothing itself; seeding at b must still recover a.
        let a = unit("a.service");
        let b = unit("b.service");
        let units: HashMap<String, &ServiceUnit> = [
            ("a.service".to_string(), &a),
            ("b.service".to_string(), &b),
        ]
        .into();
        let deps = deps_of(&[("a.service", &["b.service"]), ("b.service", &[])]);

        let members = walk_dependencies("b.service", &deps, &units);
        assert_eq!(members, vec!["b.service".to_string(), "a.service".to_string()]);
    }

    #[test]
    fn test_walk_does_not_follow_binds_to() {
        let a = unit("a.service");
        let b = unit("b.service");
        let units: HashMap<String, &ServiceUnit> = [
            ("a.service".to_string(), &a),
            ("b.service".to_string(), &b),
        ]
        .into();
        let mut deps = deps_of(&[("a.service", &[]), ("b.service", &[])]);
        deps.get_mut("a.service").unwrap().binds_to = vec!["b.service".to_string()];

        let members = walk_dependencies("a.service", &deps, &units);
        assert_eq!(members, vec!["a.service".to_string()]);

        // But the edge still lands in the debug graph.
        let edges = collect_dependency_edges(&members, &deps, &units);
        assert_eq!(
            edges,
            vec![BundleGraphEdge {
                from: "a.service".to_string(),
                to: "b.service".to_string(),
                reason: EdgeReason::BindsTo,
            }]
        );
    }

    #[test]
    fn test_walk_ignores_unknown_targets() {
        let a = unit("a.service");
        let units: HashMap<String, &ServiceUnit> = [("a.service".to_string(), &a)].into();
        let deps = deps_of(&[("a.service", &["ghost.service"])]);

        let members = walk_dependencies("a.service", &deps, &units);
        assert_eq!(members, vec!["a.service".to_string()]);
    }

    #[test]
    fn test_cycle_detection() {
        let members = vec!["a.service".to_string(), "b.service".to_string()];
        let edges = vec![
            BundleGraphEdge {
                from: "a.service".to_string(),
                to: "b.service".to_string(),
                reason: EdgeReason::Requires,
            },
            BundleGraphEdge {
                from: "b.service".to_string(),
                to: "a.service".to_string(),
                reason: EdgeReason::After,
            },
        ];
        assert!(has_dependency_cycle(&members, &edges));
        assert!(!has_dependency_cycle(&members, &edges[..1]));
    }
}
