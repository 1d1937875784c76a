use anyhow::{Result, bail};
use console::style;
use tabled::{
    Table,
    settings::{Padding, Style, object::Columns},
};

use crate::config::Config;
use crate::skills::{Skill, SkillLibrary};

pub fn list() -> Result<()> {
    let config = Config::load()?;
    let library = SkillLibrary::from_config(&config);
    let skills = library.discover()?;

    if skills.is_empty() {
        println!("No skills found in {}", library.source().display());
        return Ok(());
    }

    let mut table = Table::new(&skills);
    table
        .with(Style::blank())
        .modify(Columns::new(0..2), Padding::new(0, 1, 0, 0));
    println!("{table}");
    Ok(())
}

pub fn publish(all: bool, force: bool, names: &[String]) -> Result<()> {
    let config = Config::load()?;
    let library = SkillLibrary::from_config(&config);

    let available = library.discover()?;
    if available.is_empty() {
        bail!("No skills found in {}", library.source().display());
    }

    let selected = if !names.is_empty() {
        let found = library.find_many(names)?;
        for name in names {
            if !found.iter().any(|s| &s.name == name) {
                println!("{} Unknown skill: {}", style("!").yellow(), name);
            }
        }
        found
    } else if all {
        available
    } else {
        let known: Vec<_> = available.iter().map(|s| s.name.as_str()).collect();
        bail!(
            "Specify --all or --skills <NAME>... (available: {})",
            known.join(", ")
        );
    };

    let to_publish = resolve_conflicts(&library, selected, force)?;
    if to_publish.is_empty() {
        println!("No skills to publish.");
        return Ok(());
    }

    println!("Publishing to {}", library.target().display());
    for skill in &to_publish {
        library.publish(skill)?;
        println!("{} Published skill: {}", style("✓").green(), skill.name);
    }

    println!();
    println!("Feedback loops injected into skill templates:");
    for command in library.feedback_loops() {
        println!("  - {command}");
    }
    println!(
        "\nTo customize, set {} in .turbo.yaml and publish again.",
        style("feedback_loops").yellow()
    );
    Ok(())
}

/// Keep skills that are new to the target, or confirmed for overwrite.
fn resolve_conflicts(library: &SkillLibrary, skills: Vec<Skill>, force: bool) -> Result<Vec<Skill>> {
    if force {
        return Ok(skills);
    }
    let mut keep = Vec::new();
    for skill in skills {
        if !library.exists_in_target(&skill.name)
            || super::confirm(&format!("Skill '{}' already exists. Overwrite?", skill.name))?
        {
            keep.push(skill);
        }
    }
    Ok(keep)
}
