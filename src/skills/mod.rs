//! Agent skills: directories holding a `SKILL.md`, published into a project
//! with feedback-loop placeholders filled in.

pub mod feedback;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use fs_extra::dir as fs_dir;
use regex::Regex;
use serde::Deserialize;
use tabled::Tabled;
use tracing::{debug, info};

use crate::config::Config;

pub const SKILL_FILE: &str = "SKILL.md";

/// Replaced with the loops as inline code: `` `a`, `b` ``.
pub const FEEDBACK_LOOPS_PLACEHOLDER: &str = "{{ $feedback_loops }}";
/// Replaced with one markdown checklist line per loop.
pub const FEEDBACK_CHECKLIST_PLACEHOLDER: &str = "{{ $feedback_loops_checklist }}";

/// Loops used when none are configured.
pub const DEFAULT_FEEDBACK_LOOPS: &[&str] = &[
    "composer lint",
    "composer test",
    "composer analyse",
    "npm run lint",
    "npm run types",
    "npm run build",
    "npm run test",
];

static FRONTMATTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---").unwrap());

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

/// One publishable skill.
#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct Skill {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "DESCRIPTION")]
    pub description: String,
    #[tabled(skip)]
    pub path: PathBuf,
}

/// `name` and `description` from the YAML block opening a skill file.
/// Missing or malformed frontmatter yields neither.
fn parse_frontmatter(content: &str) -> Frontmatter {
    FRONTMATTER_RE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .and_then(|yaml| serde_yaml::from_str(yaml.as_str()).ok())
        .unwrap_or_default()
}

/// Source and target directories plus the loops substituted on publish.
#[derive(Debug, Clone)]
pub struct SkillLibrary {
    source: PathBuf,
    target: PathBuf,
    feedback_loops: Vec<String>,
}

impl SkillLibrary {
    pub fn new(source: PathBuf, target: PathBuf, configured_loops: Option<Vec<String>>) -> Self {
        let feedback_loops = configured_loops
            .filter(|loops| !loops.is_empty())
            .unwrap_or_else(|| DEFAULT_FEEDBACK_LOOPS.iter().map(|s| s.to_string()).collect());
        Self {
            source,
            target,
            feedback_loops,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let workspace = config.workspace();
        Self::new(
            config.skills_source(),
            config.skills_target(&workspace),
            config.feedback_loops.clone(),
        )
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn feedback_loops(&self) -> &[String] {
        &self.feedback_loops
    }

    /// Every skill directory directly under the source, sorted by name.
    pub fn discover(&self) -> Result<Vec<Skill>> {
        if !self.source.is_dir() {
            debug!(source = %self.source.display(), "skills:no source directory");
            return Ok(Vec::new());
        }

        let mut skills = Vec::new();
        for entry in fs::read_dir(&self.source)
            .with_context(|| format!("Failed to read {}", self.source.display()))?
        {
            let path = entry?.path();
            let skill_file = path.join(SKILL_FILE);
            if !path.is_dir() || !skill_file.is_file() {
                continue;
            }
            let dir_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = fs::read_to_string(&skill_file)
                .with_context(|| format!("Failed to read {}", skill_file.display()))?;
            let meta = parse_frontmatter(&content);
            skills.push(Skill {
                name: meta.name.filter(|n| !n.trim().is_empty()).unwrap_or(dir_name),
                description: meta.description.unwrap_or_default().trim().to_string(),
                path,
            });
        }
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(skills)
    }

    pub fn find(&self, name: &str) -> Result<Option<Skill>> {
        Ok(self.discover()?.into_iter().find(|s| s.name == name))
    }

    /// Skills for `names` in request order. Unknown names are skipped.
    pub fn find_many<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Skill>> {
        let mut found = Vec::new();
        for name in names {
            if let Some(skill) = self.find(name.as_ref())? {
                found.push(skill);
            }
        }
        Ok(found)
    }

    fn destination(&self, name: &str) -> PathBuf {
        self.target.join(name)
    }

    pub fn exists_in_target(&self, name: &str) -> bool {
        self.destination(name).is_dir()
    }

    /// Copy `skill` into the target, replacing any previous copy, then fill
    /// in the placeholders of its top-level markdown files.
    pub fn publish(&self, skill: &Skill) -> Result<PathBuf> {
        let destination = self.destination(&skill.name);
        if destination.exists() {
            fs::remove_dir_all(&destination)
                .with_context(|| format!("Failed to remove {}", destination.display()))?;
        }
        fs::create_dir_all(&destination)
            .with_context(|| format!("Failed to create {}", destination.display()))?;

        let mut options = fs_dir::CopyOptions::new();
        options.overwrite = true;
        options.content_only = true;
        fs_dir::copy(&skill.path, &destination, &options).with_context(|| {
            format!(
                "Failed to copy skill {:?} to {:?}",
                skill.path, destination
            )
        })?;

        let processed = self.process_templates_in(&destination)?;
        info!(skill = %skill.name, destination = %destination.display(), processed, "skills:published");
        Ok(destination)
    }

    /// Rewrite every `*.md` directly in `dir`. Returns how many changed.
    fn process_templates_in(&self, dir: &Path) -> Result<usize> {
        let pattern = dir.join("*.md").to_string_lossy().to_string();
        let mut changed = 0;
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let processed = self.process_template(&content);
            if processed != content {
                fs::write(&path, processed)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn process_template(&self, content: &str) -> String {
        content
            .replace(
                FEEDBACK_CHECKLIST_PLACEHOLDER,
                &format_checklist(&self.feedback_loops),
            )
            .replace(FEEDBACK_LOOPS_PLACEHOLDER, &format_inline(&self.feedback_loops))
    }
}

/// `` `a`, `b` ``
pub fn format_inline(commands: &[String]) -> String {
    commands
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_checklist(commands: &[String]) -> String {
    commands
        .iter()
        .map(|c| format!("- [ ] `{c}` passes"))
        .collect::<Vec<_>>()
        .join("\n")
}
