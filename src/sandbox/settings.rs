//! The immutable sandbox description and the identity derived from it.

use std::path::{Path, PathBuf};

use crate::config::Config;

use super::error::SandboxError;

/// Namespace token every sandbox name starts with.
pub const SANDBOX_PREFIX: &str = "claude-";

/// Everything the lifecycle manager needs to know about one sandbox.
///
/// Resolved once from configuration when the manager is built and passed
/// explicitly afterwards, so a reconfiguration mid-operation cannot leak in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Container runtime binary, e.g. `docker`.
    pub runtime: String,
    /// Tag of the image built from `template_source`.
    pub image: String,
    /// Path to the Dockerfile used as build recipe.
    pub template_source: PathBuf,
    /// Absolute path of the project mounted into the sandbox.
    pub workspace: PathBuf,
    /// Agent started inside the sandbox.
    pub entrypoint: String,
    /// Operator-configured hostnames, in configuration order.
    pub extra_hosts: Vec<String>,
}

impl SandboxConfig {
    /// Build and validate a config. Fails fast instead of letting an empty
    /// path token reach the runtime.
    pub fn new(
        runtime: impl Into<String>,
        image: impl Into<String>,
        template_source: impl Into<PathBuf>,
        workspace: impl Into<PathBuf>,
        entrypoint: impl Into<String>,
        extra_hosts: Vec<String>,
    ) -> Result<Self, SandboxError> {
        let config = Self {
            runtime: runtime.into(),
            image: image.into(),
            template_source: template_source.into(),
            workspace: workspace.into(),
            entrypoint: entrypoint.into(),
            extra_hosts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve the merged configuration into a sandbox description.
    pub fn from_config(config: &Config) -> Result<Self, SandboxError> {
        let workspace = config.workspace();
        if workspace.as_os_str().is_empty() {
            return Err(SandboxError::configuration("workspace path is empty"));
        }
        let template_source = config.docker.resolved_dockerfile(&workspace);
        if !template_source.is_file() {
            return Err(SandboxError::configuration(format!(
                "Dockerfile not found: {}",
                template_source.display()
            )));
        }

        Self::new(
            config.docker.resolved_runtime(),
            config.docker.resolved_image(&workspace),
            template_source,
            workspace,
            config.docker.resolved_agent(),
            config.docker.extra_hosts.clone().unwrap_or_default(),
        )
    }

    fn validate(&self) -> Result<(), SandboxError> {
        if self.workspace.as_os_str().is_empty() {
            return Err(SandboxError::configuration("workspace path is empty"));
        }
        if self.template_source.as_os_str().is_empty() {
            return Err(SandboxError::configuration("Dockerfile path is empty"));
        }
        if self.image.trim().is_empty() {
            return Err(SandboxError::configuration("image name is empty"));
        }
        if self.runtime.trim().is_empty() {
            return Err(SandboxError::configuration("container runtime is empty"));
        }
        Ok(())
    }

    /// Stable sandbox name for this workspace.
    pub fn identity(&self) -> String {
        identity(&self.workspace)
    }

    /// Directory passed to the runtime as build context.
    pub fn build_context(&self) -> PathBuf {
        self.template_source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Derive the sandbox name from the workspace's base directory name.
///
/// A pure function of the path: the same workspace always maps to the same
/// sandbox across runs.
pub fn identity(workspace: &Path) -> String {
    let base = workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let slug = slug::slugify(&base);
    if slug.is_empty() {
        format!("{SANDBOX_PREFIX}workspace")
    } else {
        format!("{SANDBOX_PREFIX}{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(workspace: &str) -> SandboxConfig {
        SandboxConfig::new(
            "docker",
            "turbo",
            "/opt/turbo/docker/Dockerfile",
            workspace,
            "claude",
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_identity_is_stable() {
        let path = Path::new("/home/user/projects/My App");
        assert_eq!(identity(path), identity(path));
        assert_eq!(identity(path), "claude-my-app");
    }

    #[test]
    fn test_identity_differs_per_base_name() {
        assert_ne!(
            identity(Path::new("/work/shop")),
            identity(Path::new("/work/blog"))
        );
    }

    #[test]
    fn test_identity_ignores_trailing_slash() {
        assert_eq!(
            identity(Path::new("/work/shop/")),
            identity(Path::new("/work/shop"))
        );
    }

    #[test]
    fn test_identity_for_root_falls_back() {
        assert_eq!(identity(Path::new("/")), "claude-workspace");
    }

    #[test]
    fn test_empty_workspace_is_rejected() {
        let err = SandboxConfig::new(
            "docker",
            "turbo",
            "/opt/Dockerfile",
            "",
            "claude",
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SandboxError::Configuration { .. }));
    }

    #[test]
    fn test_empty_template_source_is_rejected() {
        let err = SandboxConfig::new("docker", "turbo", "", "/work/app", "claude", Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("Dockerfile"));
    }

    #[test]
    fn test_build_context_is_dockerfile_dir() {
        let config = make_config("/work/app");
        assert_eq!(config.build_context(), PathBuf::from("/opt/turbo/docker"));
    }

    #[test]
    fn test_build_context_for_bare_file_name() {
        let config = SandboxConfig::new(
            "docker",
            "turbo",
            "Dockerfile",
            "/work/app",
            "claude",
            Vec::new(),
        )
        .unwrap();
        assert_eq!(config.build_context(), PathBuf::from("."));
    }

    #[test]
    fn test_config_identity_uses_workspace() {
        assert_eq!(make_config("/work/app").identity(), "claude-app");
    }
}
