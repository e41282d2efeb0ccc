use anyhow::Result;

use super::{Command, CommandContext};
use crate::experiment::{Experiment, ExperimentKind};

pub struct CreateCommand {
    pub name: String,
    pub kind: ExperimentKind,
}

impl CreateCommand {
    pub fn new(name: String, kind: ExperimentKind) -> Self {
        Self { name, kind }
    }
}

impl Command for CreateCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let experiment = ctx.service.create(&self.name, self.kind, &actor).await?;
        report_new(ctx, &experiment, "Drafted")
    }
}

pub struct CloneCommand {
    pub source: String,
    pub name: String,
}

impl CloneCommand {
    pub fn new(source: String, name: String) -> Self {
        Self { source, name }
    }
}

impl Command for CloneCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let experiment = ctx
            .service
            .clone_experiment(&self.source, &self.name, &actor)
            .await?;
        report_new(ctx, &experiment, &format!("Cloned {} into", self.source))
    }
}

fn report_new(ctx: &CommandContext, experiment: &Experiment, verb: &str) -> Result<()> {
    if ctx.json {
        return ctx.print_json(experiment);
    }
    println!("✅ {verb} {} experiment '{}'", experiment.kind.label(), experiment.name);
    println!("   🔖 Slug: {}", experiment.slug);
    println!("   👤 Owner: {}", experiment.owner);
    println!("   🚦 Status: {}", experiment.status.label());
    println!();
    println!("💡 Run 'experimenter sections {}' to see what still needs filling in", experiment.slug);
    Ok(())
}
