//! Detect feedback-loop commands from a project's package manifests.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

const COMPOSER_KEYS: &[&str] = &["test", "lint", "analyse", "analyze", "format", "types"];
const NPM_KEYS: &[&str] = &["build", "lint", "test", "types", "format"];

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    scripts: HashMap<String, serde_json::Value>,
}

/// Composer scripts first, then npm scripts, each in a fixed key order.
pub fn detect(workspace: &Path) -> Vec<String> {
    let mut loops = detect_scripts(&workspace.join("composer.json"), COMPOSER_KEYS, "composer");
    loops.extend(detect_scripts(
        &workspace.join("package.json"),
        NPM_KEYS,
        "npm run",
    ));
    loops
}

fn detect_scripts(manifest: &Path, keys: &[&str], runner: &str) -> Vec<String> {
    let Some(scripts) = read_scripts(manifest) else {
        return Vec::new();
    };
    keys.iter()
        .filter(|key| scripts.contains_key(**key))
        .map(|key| format!("{runner} {key}"))
        .collect()
}

fn read_scripts(manifest: &Path) -> Option<HashMap<String, serde_json::Value>> {
    let contents = fs::read_to_string(manifest).ok()?;
    match serde_json::from_str::<Manifest>(&contents) {
        Ok(manifest) => Some(manifest.scripts),
        Err(e) => {
            debug!(path = %manifest.display(), error = %e, "feedback:unreadable manifest");
            None
        }
    }
}
