//! Cross-file asset resolution.
//!
//! Starting from a unit's own file, follow sibling and referenced-file
//! links (`.pod`↔`.kube`, `Yaml=`, `Pod=`) through a worklist so that
//! multi-hop chains (`a.container → a.pod → a.kube`) are fully recovered.
//! Paths whose content was never captured are still recorded as asset
//! candidates, and the `.pod`↔`.kube` sibling implication is purely
//! name-based; only captured files contribute directive cross-references.

use crate::DirectiveCache;
use podscout_bundle_schema::{AssetKind, BundleAsset, ServiceUnit, WatchedFile};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Result of resolving one unit's related files.
#[derive(Debug, Default)]
pub struct ResolvedAssets {
    pub assets: Vec<BundleAsset>,
    pub log: Vec<String>,
}

/// Classify a file purely by its extension.
pub fn classify_asset_kind(path: &str) -> AssetKind {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "kube" => AssetKind::Kube,
        "pod" => AssetKind::Pod,
        "container" => AssetKind::Container,
        "yml" | "yaml" => AssetKind::Yaml,
        "env" | "conf" | "config" | "toml" | "json" | "ini" => AssetKind::Config,
        _ => AssetKind::Unknown,
    }
}

/// Collect every file related to `unit`, starting from its fragment/unit
/// path.
pub fn resolve_assets(
    unit: &ServiceUnit,
    files: &BTreeMap<String, WatchedFile>,
    cache: &mut DirectiveCache,
) -> ResolvedAssets {
    let mut resolved = ResolvedAssets::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    if let Some(start) = unit.fragment_path.as_deref().or(unit.unit_path.as_deref()) {
        queue.push_back(start.to_string());
    }

    while let Some(path) = queue.pop_front() {
        if !visited.insert(path.clone()) {
            continue;
        }

        let file = files.get(&path);
        resolved.assets.push(BundleAsset {
            path: path.clone(),
            kind: classify_asset_kind(&path),
            modified_at: file.and_then(|f| f.modified_at),
        });

        // Sibling links are name-based: a .pod file implies a .kube of
        // the same stem and vice versa, whether or not either side was
        // captured.
        if let Some(stem) = path.strip_suffix(".pod") {
            queue.push_back(format!("{}.kube", stem));
        } else if let Some(stem) = path.strip_suffix(".kube") {
            queue.push_back(format!("{}.pod", stem));
        }

        if file.and_then(|f| f.content.as_ref()).is_none() {
            resolved
                .log
                .push(format!("{}: content not captured, recorded as asset only", path));
            continue;
        }

        let Some(directives) = cache.directives_for(&path, files) else {
            resolved
                .log
                .push(format!("{}: not unit-file shaped, directives ignored", path));
            continue;
        };

        let dir = parent_dir(&path);
        if let Some(ref yaml) = directives.yaml {
            let literal = join(dir, yaml);
            let mut candidates = vec![literal.clone()];
            if !literal.ends_with(".yml") && !literal.ends_with(".yaml") {
                candidates.push(format!("{}.yml", literal));
                candidates.push(format!("{}.yaml", literal));
            }
            queue.push_back(pick_candidate(&candidates, files, &literal));
        }
        if let Some(ref pod) = directives.pod {
            // Pod= was stored with the `.pod` suffix stripped; the
            // extension-qualified variant is the canonical file name.
            let qualified = format!("{}.pod", join(dir, pod));
            let candidates = [join(dir, pod), qualified.clone()];
            queue.push_back(pick_candidate(&candidates, files, &qualified));
        }
        for env_file in &directives.environment_files {
            queue.push_back(join(dir, env_file));
        }
    }

    resolved
}

/// First candidate known to the collector, else `fallback` as a
/// missing-asset record.
fn pick_candidate(
    candidates: &[String],
    files: &BTreeMap<String, WatchedFile>,
    fallback: &str,
) -> String {
    candidates
        .iter()
        .find(|c| files.contains_key(*c))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve `reference` relative to `dir` unless it is already absolute.
fn join(dir: &str, reference: &str) -> String {
    if reference.starts_with('/') || dir.is_empty() {
        reference.to_string()
    } else {
        format!("{}/{}", dir, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn watched(path: &str, content: &str) -> (String, WatchedFile) {
        (
            path.to_string(),
            WatchedFile {
                path: path.to_string(),
                modified_at: None,
                content: Some(content.to_string()),
            },
        )
    }

    fn unit_with_fragment(path: &str) -> ServiceUnit {
        ServiceUnit {
            name: "web.service".to_string(),
            fragment_path: Some(path.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_asset_kind() {
        assert_eq!(classify_asset_kind("/etc/x/web.kube"), AssetKind::Kube);
        assert_eq!(classify_asset_kind("/etc/x/web.pod"), AssetKind::Pod);
        assert_eq!(classify_asset_kind("/etc/x/web.container"), AssetKind::Container);
        assert_eq!(classify_asset_kind("/etc/x/web.yml"), AssetKind::Yaml);
        assert_eq!(classify_asset_kind("/etc/x/web.yaml"), AssetKind::Yaml);
        assert_eq!(classify_asset_kind("/etc/x/web.env"), AssetKind::Config);
        assert_eq!(classify_asset_kind("/etc/x/web.socket"), AssetKind::Unknown);
    }

    #[test]
    fn test_multi_hop_chain_is_fully_recovered() {
        // a.container -> (Pod=) a.pod -> sibling a.kube -> (Yaml=) a.yml
        let files: BTreeMap<String, WatchedFile> = [
            watched(
                "/etc/containers/systemd/a.container",
                "[Container]\nImage=nginx\nPod=a.pod\n",
            ),
            watched("/etc/containers/systemd/a.pod", "[Pod]\nPodName=a\n"),
            watched("/etc/containers/systemd/a.kube", "[Kube]\nYaml=a.yml\n"),
            watched("/etc/containers/systemd/a.yml", "apiVersion: v1\nkind: Pod\n"),
        ]
        .into();
        let unit = unit_with_fragment("/etc/containers/systemd/a.container");
        let mut cache = DirectiveCache::default();

        let resolved = resolve_assets(&unit, &files, &mut cache);
        let paths: Vec<&str> = resolved.assets.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/etc/containers/systemd/a.container",
                "/etc/containers/systemd/a.pod",
                "/etc/containers/systemd/a.kube",
                "/etc/containers/systemd/a.yml",
            ]
        );
        // The YAML document is recorded but contributes no directives.
        assert!(resolved.log.iter().any(|l| l.contains("a.yml")));
    }

    #[test]
    fn test_missing_sibling_is_still_recorded() {
        let files: BTreeMap<String, WatchedFile> =
            [watched("/etc/containers/systemd/a.pod", "[Pod]\nPodName=a\n")].into();
        let unit = unit_with_fragment("/etc/containers/systemd/a.pod");
        let mut cache = DirectiveCache::default();

        let resolved = resolve_assets(&unit, &files, &mut cache);
        let kube = resolved
            .assets
            .iter()
            .find(|a| a.path.ends_with("a.kube"))
            .expect("missing sibling recorded");
        assert_eq!(kube.kind, AssetKind::Kube);
        assert!(resolved.log.iter().any(|l| l.contains("a.kube")));
    }

    #[test]
    fn test_uncaptured_pod_fragment_still_implies_kube_sibling() {
        // The collector knows the unit's fragment path but captured no
        // content for it; the name-based sibling is still recorded.
        let files: BTreeMap<String, WatchedFile> = BTreeMap::new();
        let unit = unit_with_fragment("/etc/containers/systemd/a.pod");
        let mut cache = DirectiveCache::default();

        let resolved = resolve_assets(&unit, &files, &mut cache);
        let paths: Vec<&str> = resolved.assets.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/etc/containers/systemd/a.pod",
                "/etc/containers/systemd/a.kube",
            ]
        );
    }

    #[test]
    fn test_environment_files_become_config_assets() {
        let files: BTreeMap<String, WatchedFile> = [watched(
            "/etc/containers/systemd/a.container",
            "[Container]\nImage=nginx\nEnvironmentFile=/etc/web/web.env\n",
        )]
        .into();
        let unit = unit_with_fragment("/etc/containers/systemd/a.container");
        let mut cache = DirectiveCache::default();

        let resolved = resolve_assets(&unit, &files, &mut cache);
        let env = resolved
            .assets
            .iter()
            .find(|a| a.path == "/etc/web/web.env")
            .expect("env file recorded");
        assert_eq!(env.kind, AssetKind::Config);
    }
}
