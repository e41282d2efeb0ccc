use anyhow::{bail, Result};

use super::{Command, CommandContext};
use crate::experiment::{Experiment, Status};

pub struct AdvanceCommand {
    pub slug: String,
    pub target: Option<Status>,
}

impl Command for AdvanceCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let current = ctx.service.get(&self.slug).await?;
        let before = current.status;
        let target = match self.target.or_else(|| before.next()) {
            Some(target) => target,
            None => bail!("{} is already {}", current.slug, before.label()),
        };

        let experiment = ctx.service.advance(&self.slug, target, &actor).await?;
        if ctx.json {
            return ctx.print_json(&experiment);
        }
        if before == experiment.status {
            println!("ℹ️  {} is already {}", experiment.slug, experiment.status.label());
        } else {
            println!(
                "🚦 {}: {} → {}",
                experiment.slug,
                before.label(),
                experiment.status.label()
            );
            if let Some(slug) = &experiment.delivery.slug {
                if experiment.status == Status::Ship {
                    println!("   🔖 Delivery slug: {slug}");
                }
            }
        }
        Ok(())
    }
}

pub struct ArchiveCommand {
    pub slug: String,
    pub archived: bool,
}

impl Command for ArchiveCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let experiment = ctx
            .service
            .set_archived(&self.slug, self.archived, &actor)
            .await?;
        if ctx.json {
            return ctx.print_json(&experiment);
        }
        if experiment.archived {
            println!("🗄️  Archived {}", experiment.slug);
        } else {
            println!("📤 Unarchived {}", experiment.slug);
        }
        Ok(())
    }
}

pub struct SubscribeCommand {
    pub slug: String,
    pub subscribe: bool,
}

impl Command for SubscribeCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let (experiment, changed) = if self.subscribe {
            ctx.service.subscribe(&self.slug, &actor).await?
        } else {
            ctx.service.unsubscribe(&self.slug, &actor).await?
        };
        if ctx.json {
            return ctx.print_json(&experiment);
        }
        print_subscription(&experiment, &actor.user.to_string(), self.subscribe, changed);
        Ok(())
    }
}

fn print_subscription(experiment: &Experiment, user: &str, subscribe: bool, changed: bool) {
    match (subscribe, changed) {
        (true, true) => println!("🔔 {user} now follows {}", experiment.slug),
        (true, false) => println!("ℹ️  {user} already follows {}", experiment.slug),
        (false, true) => println!("🔕 {user} no longer follows {}", experiment.slug),
        (false, false) => println!("ℹ️  {user} was not following {}", experiment.slug),
    }
}
