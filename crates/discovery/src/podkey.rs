//! Pod identity normalization and membership expansion.
//!
//! Pod identity arrives through four independent signals: an explicit
//! `Pod=`/pod-reference directive, a `.pod` file basename, a container's
//! pod name, and a compose-project label. Normalization makes those
//! spellings collide; the `PodKeyIndex` is the bipartite service↔key
//! structure the expander walks.

use podscout_bundle_schema::{EnrichedContainer, ServiceUnit};
use podscout_common::naming::sanitize_name;
use std::collections::{HashMap, HashSet, VecDeque};

/// Container labels that carry a compose project name.
pub const COMPOSE_PROJECT_LABELS: &[&str] =
    &["com.docker.compose.project", "io.podman.compose.project"];

/// Canonicalize one raw pod signal into a comparable key.
pub fn normalize_pod_key(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered.strip_prefix("systemd-").unwrap_or(&lowered);
    let stripped = stripped
        .strip_suffix(".pod")
        .or_else(|| stripped.strip_suffix("-pod"))
        .unwrap_or(stripped);
    sanitize_name(stripped)
}

/// All variant keys one raw signal registers under, so that two
/// representations of the same pod (`web`, `systemd-web`, `web.pod`)
/// still collide in the index.
pub fn pod_key_variants(raw: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let mut push = |key: String| {
        if !key.is_empty() && !variants.contains(&key) {
            variants.push(key);
        }
    };
    push(normalize_pod_key(raw));
    push(sanitize_name(raw));
    let lowered = raw.trim().to_lowercase();
    if let Some(unprefixed) = lowered.strip_prefix("systemd-") {
        push(sanitize_name(unprefixed));
    }
    variants
}

/// Bipartite service↔pod-key membership index, built once per discovery
/// run and read-only thereafter.
#[derive(Debug, Default)]
pub struct PodKeyIndex {
    key_to_units: HashMap<String, Vec<String>>,
    unit_to_keys: HashMap<String, Vec<String>>,
}

/// Result of one membership expansion.
#[derive(Debug, Default)]
pub struct PodExpansion {
    /// Full member set, seed units first, in discovery order.
    pub members: Vec<String>,
    /// For units added by the expansion, the pod key that pulled them in.
    pub via_key: HashMap<String, String>,
    /// Every pod key touched while expanding.
    pub touched_keys: Vec<String>,
}

impl PodKeyIndex {
    /// Register every unit's own pod signals and every linked container's
    /// pod signals.
    pub fn build(
        services: &[ServiceUnit],
        containers: &[EnrichedContainer],
        directives_pods: &HashMap<String, Vec<String>>,
    ) -> Self {
        let mut index = PodKeyIndex::default();

        for unit in services {
            if let Some(ref pod_ref) = unit.pod_reference {
                index.register(&unit.name, pod_ref);
            }
            if let Some(pods) = directives_pods.get(&unit.name) {
                for pod in pods {
                    index.register(&unit.name, pod);
                }
            }
            // A `.pod` fragment's basename is itself a pod signal.
            if let Some(path) = unit.fragment_path.as_deref().or(unit.unit_path.as_deref()) {
                if let Some(stem) = path.rsplit('/').next().and_then(|f| f.strip_suffix(".pod")) {
                    index.register(&unit.name, stem);
                }
            }

            for container in containers
                .iter()
                .filter(|c| unit.container_ids.contains(&c.id))
            {
                if let Some(ref pod_name) = container.pod_name {
                    index.register(&unit.name, pod_name);
                }
                for label in COMPOSE_PROJECT_LABELS {
                    if let Some(project) = container.labels.get(*label) {
                        index.register(&unit.name, project);
                    }
                }
            }
        }

        index
    }

    /// Register one raw signal for a unit, under every variant key.
    pub fn register(&mut self, unit_name: &str, raw_signal: &str) {
        for key in pod_key_variants(raw_signal) {
            let units = self.key_to_units.entry(key.clone()).or_default();
            if !units.contains(&unit_name.to_string()) {
                units.push(unit_name.to_string());
            }
            let keys = self.unit_to_keys.entry(unit_name.to_string()).or_default();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    /// Pod keys a unit registered under.
    pub fn keys_for(&self, unit_name: &str) -> &[String] {
        self.unit_to_keys
            .get(unit_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when any unit registered under any variant of `raw_signal`.
    pub fn is_claimed(&self, raw_signal: &str) -> bool {
        pod_key_variants(raw_signal)
            .iter()
            .any(|key| self.key_to_units.contains_key(key))
    }

    /// Breadth-first closure over shared pod identity: enqueue every key
    /// touched by the seed, pull in every unit registered under those
    /// keys, and recurse until nothing new appears. Recovers units that
    /// share a pod without any explicit dependency edge between them.
    pub fn expand(&self, seed: &[String]) -> PodExpansion {
        let mut expansion = PodExpansion::default();
        let mut seen_units: HashSet<String> = HashSet::new();
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for unit in seed {
            if seen_units.insert(unit.clone()) {
                expansion.members.push(unit.clone());
            }
            for key in self.keys_for(unit) {
                if seen_keys.insert(key.clone()) {
                    expansion.touched_keys.push(key.clone());
                    queue.push_back(key.clone());
                }
            }
        }

        while let Some(key) = queue.pop_front() {
            let Some(units) = self.key_to_units.get(&key) else {
                continue;
            };
            for unit in units {
                if !seen_units.insert(unit.clone()) {
                    continue;
                }
                expansion.members.push(unit.clone());
                expansion.via_key.insert(unit.clone(), key.clone());
                for next_key in self.keys_for(unit) {
                    if seen_keys.insert(next_key.clone()) {
                        expansion.touched_keys.push(next_key.clone());
                        queue.push_back(next_key.clone());
                    }
                }
            }
        }

        expansion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit(name: &str, pod_reference: Option<&str>) -> ServiceUnit {
        ServiceUnit {
            name: name.to_string(),
            pod_reference: pod_reference.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_pod_key() {
        assert_eq!(normalize_pod_key("web"), "web");
        assert_eq!(normalize_pod_key("systemd-web"), "web");
        assert_eq!(normalize_pod_key("Web.pod"), "web");
        assert_eq!(normalize_pod_key("my-app-pod"), "my-app");
        assert_eq!(normalize_pod_key("  My App!  "), "my-app");
    }

    #[test]
    fn test_variants_collide_for_equivalent_spellings() {
        // "web" and "systemd-web" must share at least one key.
        let plain = pod_key_variants("web");
        let prefixed = pod_key_variants("systemd-web");
        assert!(plain.iter().any(|k| prefixed.contains(k)));
    }

    #[test]
    fn test_expand_pulls_in_pod_siblings() {
        let services = vec![
            unit("a.service", Some("shared")),
            unit("b.service", Some("systemd-shared")),
            unit("c.service", Some("other")),
        ];
        let index = PodKeyIndex::build(&services, &[], &HashMap::new());

        let expansion = index.expand(&["a.service".to_string()]);
        assert_eq!(
            expansion.members,
            vec!["a.service".to_string(), "b.service".to_string()]
        );
        assert_eq!(
            expansion.via_key.get("b.service").map(String::as_str),
            Some("shared")
        );
    }

    #[test]
    fn test_expand_recurses_across_keys() {
        // b registers under both "shared" and "deep"; d only under "deep".
        let mut index = PodKeyIndex::default();
        index.register("a.service", "shared");
        index.register("b.service", "shared");
        index.register("b.service", "deep");
        index.register("d.service", "deep");

        let expansion = index.expand(&["a.service".to_string()]);
        assert_eq!(
            expansion.members,
            vec![
                "a.service".to_string(),
                "b.service".to_string(),
                "d.service".to_string()
            ]
        );
    }

    #[test]
    fn test_is_claimed() {
        let mut index = PodKeyIndex::default();
        index.register("a.service", "web");
        assert!(index.is_claimed("web"));
        assert!(index.is_claimed("systemd-web"));
        assert!(!index.is_claimed("orphan"));
    }
}
