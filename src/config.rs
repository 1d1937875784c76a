use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project config file names, in lookup order.
const PROJECT_CONFIG_NAMES: [&str; 2] = [".turbo.yaml", ".turbo.yml"];

/// Dockerfile looked up in the workspace before falling back to the global one.
const WORKSPACE_DOCKERFILE: &str = "Dockerfile.turbo";

const DEFAULT_RUNTIME: &str = "docker";
const DEFAULT_AGENT: &str = "claude";
const DEFAULT_SKILLS_TARGET: &str = ".ai/skills";

/// Container runtime and sandbox settings.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct DockerConfig {
    /// Runtime binary. Default: docker
    #[serde(default)]
    pub runtime: Option<String>,

    /// Image tag built from the Dockerfile. Default: turbo/<workspace name>
    #[serde(default)]
    pub image: Option<String>,

    /// Dockerfile used as the sandbox template.
    #[serde(default)]
    pub dockerfile: Option<PathBuf>,

    /// Project directory mounted into the sandbox.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    /// Agent started inside the sandbox. Default: claude
    #[serde(default)]
    pub agent: Option<String>,

    /// Hostnames the sandbox may reach on the host through the proxy.
    #[serde(default)]
    pub extra_hosts: Option<Vec<String>>,
}

impl DockerConfig {
    pub fn resolved_runtime(&self) -> String {
        self.runtime
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string())
    }

    pub fn resolved_agent(&self) -> String {
        self.agent
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT.to_string())
    }

    pub fn resolved_image(&self, workspace: &Path) -> String {
        if let Some(image) = self.image.as_ref().filter(|s| !s.trim().is_empty()) {
            return image.clone();
        }
        let name = workspace
            .file_name()
            .map(|n| slug::slugify(n.to_string_lossy()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "sandbox".to_string());
        format!("turbo/{name}")
    }

    /// Configured Dockerfile (relative to the workspace), else
    /// `Dockerfile.turbo` in the workspace, else the global one.
    pub fn resolved_dockerfile(&self, workspace: &Path) -> PathBuf {
        if let Some(path) = &self.dockerfile {
            return absolutize(path, workspace);
        }
        let local = workspace.join(WORKSPACE_DOCKERFILE);
        if local.is_file() {
            return local;
        }
        global_config_dir()
            .map(|dir| dir.join("Dockerfile"))
            .unwrap_or(local)
    }
}

/// Skill publishing locations.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct SkillsConfig {
    /// Directory holding one subdirectory per skill.
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// Target directory, relative to the workspace. Default: .ai/skills
    #[serde(default)]
    pub target: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub docker: DockerConfig,

    /// Commands the agent must keep green, e.g. `composer test`.
    #[serde(default)]
    pub feedback_loops: Option<Vec<String>>,

    #[serde(default)]
    pub skills: SkillsConfig,

    /// Directory of the project config file this config was loaded from.
    #[serde(skip)]
    pub project_dir: Option<PathBuf>,
}

/// Find the nearest project config by walking up from `start_dir`.
pub fn find_project_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir
        .canonicalize()
        .unwrap_or_else(|_| start_dir.to_path_buf());

    loop {
        for name in PROJECT_CONFIG_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "config:found project config");
                return Some(candidate);
            }
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// `~/.config/turbo`.
pub fn global_config_dir() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".config/turbo"))
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Config {
    /// Load global and project configuration, merge them and apply the
    /// `TURBO_*` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        debug!("config:loading");
        let start_dir = env::current_dir().unwrap_or_default();
        let global = Self::load_global()?.unwrap_or_default();
        let mut config = Self::load_layers(global, &start_dir)?;
        config.apply_env_overrides(|key| env::var(key).ok());

        debug!(
            workspace = %config.workspace().display(),
            runtime = %config.docker.resolved_runtime(),
            has_project = config.project_dir.is_some(),
            "config:loaded"
        );
        Ok(config)
    }

    /// Merge the project config found from `start_dir` over `global`.
    fn load_layers(global: Self, start_dir: &Path) -> anyhow::Result<Self> {
        let Some(path) = find_project_config(start_dir) else {
            return Ok(global);
        };
        let project = Self::load_from_path(&path)?.unwrap_or_default();
        let mut merged = global.merge(project);
        merged.project_dir = path.parent().map(Path::to_path_buf);
        Ok(merged)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)?;
        // Comment-only files (like the `init` template) configure nothing.
        if contents
            .lines()
            .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
        {
            return Ok(Some(Self::default()));
        }
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(Some(config))
    }

    /// Load the global configuration file from `~/.config/turbo`.
    fn load_global() -> anyhow::Result<Option<Self>> {
        if let Some(dir) = global_config_dir() {
            for name in ["config.yaml", "config.yml"] {
                let path = dir.join(name);
                if path.exists() {
                    return Self::load_from_path(&path);
                }
            }
        }
        Ok(None)
    }

    /// Merge a project config into a global config.
    /// Project config takes precedence. For lists, "<global>" placeholder expands to global items.
    fn merge(self, project: Self) -> Self {
        fn merge_vec_with_placeholder(
            global: Option<Vec<String>>,
            project: Option<Vec<String>>,
        ) -> Option<Vec<String>> {
            match (global, project) {
                (Some(global_items), Some(project_items)) => {
                    if !project_items.iter().any(|s| s == "<global>") {
                        return Some(project_items);
                    }
                    let mut result = Vec::new();
                    for item in project_items {
                        if item == "<global>" {
                            result.extend(global_items.iter().cloned());
                        } else {
                            result.push(item);
                        }
                    }
                    Some(result)
                }
                // A lone placeholder with nothing to expand is dropped.
                (None, Some(project_items)) => Some(
                    project_items
                        .into_iter()
                        .filter(|s| s != "<global>")
                        .collect(),
                ),
                (global, None) => global,
            }
        }

        macro_rules! merge_options {
            ($global:expr, $project:expr, $field:ident) => {
                $project.$field.or($global.$field)
            };
        }

        let (runtime, image, dockerfile, workspace, agent) = (
            merge_options!(self.docker, project.docker, runtime),
            merge_options!(self.docker, project.docker, image),
            merge_options!(self.docker, project.docker, dockerfile),
            merge_options!(self.docker, project.docker, workspace),
            merge_options!(self.docker, project.docker, agent),
        );

        Self {
            docker: DockerConfig {
                runtime,
                image,
                dockerfile,
                workspace,
                agent,
                extra_hosts: merge_vec_with_placeholder(
                    self.docker.extra_hosts,
                    project.docker.extra_hosts,
                ),
            },
            feedback_loops: merge_vec_with_placeholder(self.feedback_loops, project.feedback_loops),
            skills: SkillsConfig {
                source: merge_options!(self.skills, project.skills, source),
                target: merge_options!(self.skills, project.skills, target),
            },
            project_dir: project.project_dir.or(self.project_dir),
        }
    }

    /// Environment variables win over both config files.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(image) = get("TURBO_DOCKER_IMAGE") {
            self.docker.image = Some(image);
        }
        if let Some(workspace) = get("TURBO_DOCKER_WORKSPACE") {
            self.docker.workspace = Some(PathBuf::from(workspace));
        }
        if let Some(dockerfile) = get("TURBO_DOCKER_DOCKERFILE") {
            self.docker.dockerfile = Some(PathBuf::from(dockerfile));
        }
        if let Some(runtime) = get("TURBO_DOCKER_RUNTIME") {
            self.docker.runtime = Some(runtime);
        }
    }

    /// Absolute workspace path: configured, else the project config's
    /// directory, else the current directory.
    pub fn workspace(&self) -> PathBuf {
        let cwd = env::current_dir().unwrap_or_default();
        let base = self.project_dir.clone().unwrap_or(cwd);
        match &self.docker.workspace {
            Some(path) => absolutize(path, &base),
            None => base,
        }
    }

    pub fn skills_source(&self) -> PathBuf {
        if let Some(source) = &self.skills.source {
            return match (source.strip_prefix("~"), home::home_dir()) {
                (Ok(rest), Some(home)) => home.join(rest),
                _ => source.clone(),
            };
        }
        home::home_dir()
            .map(|home| home.join(".local/share/turbo/skills"))
            .unwrap_or_else(|| PathBuf::from("skills"))
    }

    pub fn skills_target(&self, workspace: &Path) -> PathBuf {
        let target = self
            .skills
            .target
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SKILLS_TARGET));
        absolutize(&target, workspace)
    }

    /// Create an example .turbo.yaml configuration file
    pub fn init() -> anyhow::Result<()> {
        let config_path = PathBuf::from(PROJECT_CONFIG_NAMES[0]);

        if config_path.exists() {
            return Err(anyhow::anyhow!(
                ".turbo.yaml already exists. Remove it first if you want to regenerate it."
            ));
        }

        fs::write(&config_path, EXAMPLE_CONFIG)?;

        println!("✓ Created .turbo.yaml");
        println!("\nThis file provides project-specific overrides.");
        println!("For global settings, edit ~/.config/turbo/config.yaml");

        Ok(())
    }
}

const EXAMPLE_CONFIG: &str = r#"# turbo project configuration
# For global settings, edit ~/.config/turbo/config.yaml
# All options below are commented out - uncomment to override defaults.

#-------------------------------------------------------------------------------
# Sandbox
#-------------------------------------------------------------------------------

# docker:
#   # Container runtime binary.
#   runtime: docker
#
#   # Image built by `turbo build`. Default: turbo/<directory name>
#   image: turbo/my-app
#
#   # Sandbox template. Default: ./Dockerfile.turbo if present,
#   # else ~/.config/turbo/Dockerfile
#   dockerfile: ./Dockerfile.turbo
#
#   # Directory mounted into the sandbox. Default: this file's directory.
#   workspace: .
#
#   # Agent started inside the sandbox.
#   agent: claude
#
#   # Hosts on your machine the sandbox may reach (APP_URL from .env is
#   # added automatically). Use "<global>" to inherit from global config.
#   extra_hosts:
#     - "<global>"
#     - api.my-app.test

#-------------------------------------------------------------------------------
# Skills
#-------------------------------------------------------------------------------

# Commands substituted into published skills. Detected from composer.json
# and package.json by `turbo feedback-loops`.
# feedback_loops:
#   - composer test
#   - npm run build

# skills:
#   source: ~/.local/share/turbo/skills
#   target: .ai/skills
"#;
