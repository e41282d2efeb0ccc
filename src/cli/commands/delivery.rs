use anyhow::Result;

use super::{Command, CommandContext};
use crate::delivery::{build_recipe, NormandyClient};

pub struct RecipeCommand {
    pub slug: String,
}

impl Command for RecipeCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let experiment = ctx.service.get(&self.slug).await?;
        let experiment_url = format!(
            "{}/{}/",
            ctx.config.delivery.experiment_url.trim_end_matches('/'),
            experiment.slug
        );
        let recipe = build_recipe(&experiment, &experiment_url)?;
        // Always JSON: the recipe is meant to be pasted into the delivery admin
        ctx.print_json(&recipe)
    }
}

pub struct RecordDeliveryCommand {
    pub slug: String,
    pub recipe_id: u64,
    pub others: Vec<u64>,
}

impl Command for RecordDeliveryCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let experiment = ctx
            .service
            .record_delivery(&self.slug, &actor, self.recipe_id, self.others.clone())
            .await?;
        if ctx.json {
            return ctx.print_json(&experiment.delivery);
        }
        println!("🧾 {} delivered by recipe {}", experiment.slug, self.recipe_id);
        if !self.others.is_empty() {
            let others: Vec<String> = self.others.iter().map(u64::to_string).collect();
            println!("   Other recipes: {}", others.join(", "));
        }
        Ok(())
    }
}

pub struct SyncCommand {
    pub slug: String,
}

impl Command for SyncCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor()?;
        let client = NormandyClient::new(&ctx.config.delivery.api_url, ctx.config.delivery.timeout())?;
        let before = ctx.service.get(&self.slug).await?;
        let experiment = ctx.service.sync_delivery(&self.slug, &client, &actor).await?;
        if ctx.json {
            return ctx.print_json(&experiment);
        }

        if experiment.delivery.recipe_id.is_none() {
            println!("ℹ️  {} has no recipe recorded yet", experiment.slug);
        } else if before.status == experiment.status {
            println!("🔄 {} is still {}", experiment.slug, experiment.status.label());
        } else {
            println!(
                "🔄 {}: {} → {}",
                experiment.slug,
                before.status.label(),
                experiment.status.label()
            );
        }
        if experiment.delivery.enrollment_paused != before.delivery.enrollment_paused {
            if experiment.delivery.enrollment_paused {
                println!("   ⏸️  Enrollment paused");
            } else {
                println!("   ▶️  Enrollment resumed");
            }
        }
        Ok(())
    }
}
