//! Unit-file directive parsing.
//!
//! The parser is total: malformed lines are skipped, unknown sections and
//! keys are ignored, and the result is always a (possibly empty)
//! `QuadletDirectives`.

use podscout_bundle_schema::{PublishedPort, QuadletDirectives, UnitSourceType};

/// Parse one unit file's text into typed directives.
///
/// Repeated list-valued keys accumulate (a second `Requires=` line appends),
/// duplicates are suppressed and insertion order is preserved. Repeated
/// `Environment=` entries for the same variable overwrite.
pub fn parse_unit_file(text: &str) -> QuadletDirectives {
    let mut directives = QuadletDirectives::default();
    let mut section = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].to_lowercase();
            match section.as_str() {
                "container" => directives.source_type = UnitSourceType::Container,
                "pod" => directives.source_type = UnitSourceType::Pod,
                "kube" => directives.source_type = UnitSourceType::Kube,
                _ => {}
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }

        dispatch(&mut directives, &section, &key, value);
    }

    directives
}

/// Tag the unit-file flavor from raw text, for callers that have not
/// already determined it from the file extension.
pub fn classify_source_type(text: &str) -> UnitSourceType {
    for line in text.lines() {
        match line.trim().to_lowercase().as_str() {
            "[container]" => return UnitSourceType::Container,
            "[pod]" => return UnitSourceType::Pod,
            "[kube]" => return UnitSourceType::Kube,
            _ => {}
        }
    }
    UnitSourceType::Service
}

/// Cheap check that text is plausibly a unit file at all. Content that is
/// neither sectioned nor key=value shaped (e.g. a Kubernetes YAML document)
/// is treated as "not directives" by discovery.
pub fn looks_like_unit_file(text: &str) -> bool {
    text.lines().map(str::trim).any(|line| {
        (line.starts_with('[') && line.ends_with(']') && line.len() > 2)
            || (!line.starts_with('#')
                && !line.starts_with(';')
                && line.split_once('=').is_some_and(|(k, _)| {
                    !k.trim().is_empty() && !k.contains(':') && !k.contains(' ')
                }))
    })
}

fn dispatch(directives: &mut QuadletDirectives, section: &str, key: &str, value: &str) {
    match (section, key) {
        ("unit", "requires") => append_units(&mut directives.requires, value),
        ("unit", "after") => append_units(&mut directives.after, value),
        ("unit", "wants") => append_units(&mut directives.wants, value),
        ("unit", "bindsto") => append_units(&mut directives.binds_to, value),

        ("container", "containername") => directives.container_name = Some(value.to_string()),
        ("container", "image") => directives.image = Some(value.to_string()),
        ("container", "environment") => {
            if let Some((name, val)) = value.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    directives
                        .environment
                        .insert(name.to_string(), unquote(val.trim()).to_string());
                }
            }
        }
        ("container", "volume") => push_unique(&mut directives.volumes, value.to_string()),
        ("container", "environmentfile") => {
            push_unique(&mut directives.environment_files, value.to_string())
        }
        ("container", "pod") => {
            let pod = value.strip_suffix(".pod").unwrap_or(value);
            directives.pod = Some(pod.to_string());
        }
        ("container", "publishport") | ("pod", "publishport") => {
            if let Some(port) = parse_publish_port(value) {
                if !directives.publish_ports.contains(&port) {
                    directives.publish_ports.push(port);
                }
            }
        }

        ("pod", "podname") => directives.pod_name = Some(value.to_string()),

        ("kube", "yaml") => directives.yaml = Some(value.to_string()),
        ("kube", "autoupdate") => directives.auto_update = Some(value.to_string()),

        ("install", "wantedby") => append_targets(&mut directives.wanted_by, value),
        ("install", "requiredby") => append_targets(&mut directives.required_by, value),

        _ => {}
    }
}

/// Parse one `PublishPort=` value: `port`, `host:container` or
/// `ip:host:container`, with an optional `/tcp|/udp` suffix.
///
/// Split from the right so an IPv6 host address does not corrupt the
/// port fields. A bare `port` publishes the same port on host and
/// container.
pub fn parse_publish_port(value: &str) -> Option<PublishedPort> {
    let (spec, protocol) = match value.rsplit_once('/') {
        Some((spec, proto)) if proto.eq_ignore_ascii_case("udp") => (spec, "udp"),
        Some((spec, proto)) if proto.eq_ignore_ascii_case("tcp") => (spec, "tcp"),
        _ => (value, "tcp"),
    };

    let mut parts: Vec<&str> = spec.rsplitn(3, ':').collect();
    parts.reverse();

    let port = |s: &str| s.trim().parse::<u16>().ok();
    match parts.as_slice() {
        [only] => {
            let p = port(only)?;
            Some(PublishedPort {
                host_ip: None,
                host_port: p,
                container_port: p,
                protocol: protocol.to_string(),
            })
        }
        [host, container] => Some(PublishedPort {
            host_ip: None,
            host_port: port(host)?,
            container_port: port(container)?,
            protocol: protocol.to_string(),
        }),
        [ip, host, container] => Some(PublishedPort {
            host_ip: Some(ip.trim_matches(|c| c == '[' || c == ']').to_string()),
            host_port: port(host)?,
            container_port: port(container)?,
            protocol: protocol.to_string(),
        }),
        _ => None,
    }
}

/// Split a dependency list and normalize each entry to end in `.service`.
fn append_units(list: &mut Vec<String>, value: &str) {
    for entry in split_list(value) {
        let entry = if entry.ends_with(".service") {
            entry.to_string()
        } else {
            format!("{}.service", entry)
        };
        push_unique(list, entry);
    }
}

/// Split an install-target list; targets keep their own suffix.
fn append_targets(list: &mut Vec<String>, value: &str) {
    for entry in split_list(value) {
        push_unique(list, entry.to_string());
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn push_unique(list: &mut Vec<String>, entry: String) {
    if !list.contains(&entry) {
        list.push(entry);
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
