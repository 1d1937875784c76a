//! Hostnames the sandbox must reach on the operator's machine.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Environment file read from the workspace root.
pub const ENV_FILE: &str = ".env";

/// Matches the `APP_URL` line holding the application's base URL.
static APP_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:export[ \t]+)?APP_URL[ \t]*=[ \t]*(.*?)[ \t\r]*$").unwrap()
});

/// A hostname paired with the bridge address used to reach the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMapping {
    pub hostname: String,
    pub bridge_address: String,
}

impl fmt::Display for HostMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.hostname, self.bridge_address)
    }
}

/// Workspace-derived host first, then configured hosts, deduplicated in
/// first-seen order.
///
/// A missing `.env`, a missing key or an unparseable URL all just drop that
/// source.
pub fn resolve_hosts(workspace: &Path, configured: &[String]) -> Vec<String> {
    let app_host = read_app_url(workspace).and_then(|url| host_from_url(&url));
    debug!(?app_host, configured = ?configured, "hosts:resolve");

    let mut seen = HashSet::new();
    app_host
        .into_iter()
        .chain(configured.iter().map(|h| h.trim().to_string()))
        .filter(|h| !h.is_empty())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

/// Pair every host with the same bridge address.
pub fn map_hosts(hosts: &[String], bridge_address: &str) -> Vec<HostMapping> {
    hosts
        .iter()
        .map(|hostname| HostMapping {
            hostname: hostname.clone(),
            bridge_address: bridge_address.to_string(),
        })
        .collect()
}

fn read_app_url(workspace: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(workspace.join(ENV_FILE)).ok()?;
    parse_app_url(&contents)
}

/// Value of the first `APP_URL=` line, unquoted.
fn parse_app_url(contents: &str) -> Option<String> {
    let caps = APP_URL_RE.captures(contents)?;
    let raw = caps.get(1)?.as_str();
    let value = raw
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(raw)
        .trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Host component of a URL; scheme, port and path are dropped.
fn host_from_url(value: &str) -> Option<String> {
    let parsed = if value.contains("://") {
        url::Url::parse(value).ok()?
    } else {
        url::Url::parse(&format!("http://{value}")).ok()?
    };
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_string())
}
