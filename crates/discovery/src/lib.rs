//! Bundle discovery and stack synthesis.
//!
//! A pure, synchronous transformation over one node's collector snapshot:
//! parse unit-file directives lazily, walk dependency and pod-membership
//! graphs to build one neighborhood per unmanaged root unit, assemble a
//! draft bundle per neighborhood, merge drafts sharing a pod, synthesize
//! bundles for orphan pods, and, on request, render any bundle into a
//! deployable Pod-spec/unit-file pair. No I/O, no threads, no panics:
//! degraded inputs surface as bundle validations and discovery-log lines.

pub mod assemble;
pub mod assets;
pub mod graph;
pub mod merge;
pub mod podkey;
pub mod quadlet;
pub mod stack;

use assemble::{assemble_bundle, is_excluded, NodeContext};
use podscout_bundle_schema::{
    EnrichedContainer, QuadletDirectives, ServiceBundle, ServiceUnit, WatchedFile,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

pub use quadlet::{classify_source_type, parse_publish_port, parse_unit_file};
pub use stack::{generate_stack_artifacts, generate_stack_preview, parse_volume};

/// Memoized per-file directive parses for one or more discovery runs.
///
/// The cache is an explicit value owned by the caller, never a hidden
/// module-level singleton. `build_service_bundles_for_node` creates a
/// fresh one per run; callers that reuse a cache across runs own its
/// invalidation (call [`DirectiveCache::clear`] under their TTL policy).
#[derive(Debug, Default)]
pub struct DirectiveCache {
    entries: HashMap<String, Option<QuadletDirectives>>,
}

impl DirectiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every memoized parse.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Parse (or recall) the directives of one watched file. `None` when
    /// the path is unknown, its content is not yet captured, or the
    /// content is not unit-file shaped.
    pub fn directives_for(
        &mut self,
        path: &str,
        files: &BTreeMap<String, WatchedFile>,
    ) -> Option<QuadletDirectives> {
        if let Some(cached) = self.entries.get(path) {
            return cached.clone();
        }
        let parsed = files
            .get(path)
            .and_then(|f| f.content.as_deref())
            .filter(|text| quadlet::looks_like_unit_file(text))
            .map(quadlet::parse_unit_file);
        self.entries.insert(path.to_string(), parsed.clone());
        parsed
    }
}

/// Discover every service bundle on one node, with a fresh directive
/// cache. Output is sorted by severity (critical first), then display
/// name.
pub fn build_service_bundles_for_node(
    node_name: &str,
    services: &[ServiceUnit],
    containers: &[EnrichedContainer],
    files: &BTreeMap<String, WatchedFile>,
) -> Vec<ServiceBundle> {
    let mut cache = DirectiveCache::new();
    build_service_bundles_with_cache(node_name, services, containers, files, &mut cache)
}

/// Discovery with a caller-owned [`DirectiveCache`].
pub fn build_service_bundles_with_cache(
    node_name: &str,
    services: &[ServiceUnit],
    containers: &[EnrichedContainer],
    files: &BTreeMap<String, WatchedFile>,
    cache: &mut DirectiveCache,
) -> Vec<ServiceBundle> {
    // Step 1: index units, containers and pod signals for this run.
    let ctx = NodeContext::build(node_name, services, containers, files, cache);

    // Step 2: one draft bundle per unmanaged, non-excluded root not yet
    // absorbed into an earlier bundle. Sequential on purpose: later roots
    // consult the claim map populated by earlier roots, and a later
    // neighborhood overlapping an earlier one collapses into it so that
    // no unit ends up a member of two drafts.
    let mut claimed_by: HashMap<String, usize> = HashMap::new();
    let mut drafts: Vec<ServiceBundle> = Vec::new();
    for unit in services {
        if unit.is_managed || is_excluded(unit) || claimed_by.contains_key(&unit.name) {
            continue;
        }
        let (bundle, members) = assemble_bundle(&ctx, cache, &unit.name);
        debug!(
            root = %unit.name,
            bundle = %bundle.id,
            members = members.len(),
            "assembled draft bundle"
        );
        let idx = match members.iter().find_map(|m| claimed_by.get(m).copied()) {
            Some(idx) => {
                merge::merge_into(&mut drafts[idx], bundle, "overlapping neighborhood");
                idx
            }
            None => {
                drafts.push(bundle);
                drafts.len() - 1
            }
        };
        for member in members {
            claimed_by.insert(member, idx);
        }
    }

    // Step 3: collapse drafts sharing a pod identity.
    let mut bundles = merge::merge_bundles(drafts);

    // Step 4: synthesize bundles for pods no unit claims.
    bundles.extend(merge::synthesize_orphan_bundles(&ctx));

    // Step 5: worst first, then by name.
    bundles.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });

    info!(
        node = node_name,
        bundles = bundles.len(),
        "discovery run complete"
    );
    bundles
}
