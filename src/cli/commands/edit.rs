use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{Command, CommandContext};
use crate::experiment::{Branch, ExperimentUpdate, SignOff};

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub struct EditCommand {
    pub slug: String,
    pub file: PathBuf,
}

impl Command for EditCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let update: ExperimentUpdate = read_json(&self.file)?;
        let section = update.section_name();
        let before = ctx.service.get(&self.slug).await?.version;
        let experiment = ctx.service.update(&self.slug, &actor, update).await?;
        if ctx.json {
            return ctx.print_json(&experiment);
        }
        if experiment.version == before {
            println!("ℹ️  No changes to {section} of {}", experiment.slug);
        } else if let Some(entry) = experiment.history.latest() {
            println!("✏️  Updated {section} of {}", experiment.slug);
            for change in entry.changed_values.values() {
                println!("   • {}", change.display_name);
            }
        }
        Ok(())
    }
}

pub struct BranchesCommand {
    pub slug: String,
    pub file: PathBuf,
}

impl Command for BranchesCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let branches: Vec<Branch> = read_json(&self.file)?;
        let experiment = ctx.service.set_branches(&self.slug, &actor, branches).await?;
        if ctx.json {
            return ctx.print_json(&experiment.content.branches);
        }
        println!("🌿 Branches of {}:", experiment.slug);
        for branch in &experiment.content.branches {
            let marker = if branch.is_control { " (control)" } else { "" };
            println!("   {} [{}] {}%{}", branch.name, branch.slug, branch.ratio, marker);
        }
        Ok(())
    }
}

pub struct SignOffCommand {
    pub slug: String,
    pub set: Vec<SignOff>,
    pub clear: Vec<SignOff>,
}

impl SignOffCommand {
    /// Requested changes; a sign-off named in both lists ends up set
    pub fn changes(&self) -> BTreeMap<SignOff, bool> {
        let mut changes = BTreeMap::new();
        for sign_off in &self.clear {
            changes.insert(*sign_off, false);
        }
        for sign_off in &self.set {
            changes.insert(*sign_off, true);
        }
        changes
    }
}

impl Command for SignOffCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let changes = self.changes();
        if changes.is_empty() {
            bail!("Nothing to do: pass --set or --clear");
        }
        let actor = ctx.actor()?;
        let (experiment, denied) = ctx.service.set_sign_offs(&self.slug, &actor, &changes).await?;
        if ctx.json {
            return ctx.print_json(&serde_json::json!({
                "experiment": experiment.slug,
                "sign_offs": experiment.sign_offs,
                "denied": denied,
            }));
        }

        for (sign_off, value) in &changes {
            if denied.contains(sign_off) {
                continue;
            }
            let mark = if *value { "✅" } else { "⬜" };
            println!("{mark} {}", sign_off.label());
        }
        for sign_off in &denied {
            let permission = sign_off
                .required_permission()
                .map(|p| p.as_str())
                .unwrap_or_default();
            println!("🚫 {} needs the {permission} permission; left unchanged", sign_off.label());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_wins_over_clear() {
        let command = SignOffCommand {
            slug: "x".to_string(),
            set: vec![SignOff::Science],
            clear: vec![SignOff::Science, SignOff::Legal],
        };
        let changes = command.changes();
        assert_eq!(changes.get(&SignOff::Science), Some(&true));
        assert_eq!(changes.get(&SignOff::Legal), Some(&false));
    }
}
