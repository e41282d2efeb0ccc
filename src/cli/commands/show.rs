use anyhow::Result;
use serde_json::Value;

use super::{Command, CommandContext};
use crate::experiment::sections::section_reports;
use crate::experiment::signoff::{missing_sign_offs, required_sign_offs};
use crate::experiment::{grouped_history, ExperimentKind, FieldChange, Status, UserId};
use crate::store::ListFilter;

pub struct ShowCommand {
    pub slug: String,
}

impl Command for ShowCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let experiment = ctx.service.get(&self.slug).await?;
        if ctx.json {
            return ctx.print_json(&experiment);
        }

        println!("🧪 {} ({})", experiment.name, experiment.slug);
        println!("   📦 Type: {}", experiment.kind.label());
        println!("   🚦 Status: {}", experiment.status.label());
        println!("   👤 Owner: {}", experiment.owner);
        if experiment.archived {
            println!("   🗄️  Archived");
        }
        println!("   🔢 Version: {}", experiment.version);

        let population = experiment.content.population.summary();
        if !population.is_empty() {
            println!("   👥 Population: {population}");
        }
        if let Some(end) = experiment.content.timeline.proposed_end_date() {
            println!("   📅 Proposed end: {end}");
        }

        if !experiment.content.branches.is_empty() {
            println!();
            println!("🌿 BRANCHES:");
            for branch in &experiment.content.branches {
                let marker = if branch.is_control { " (control)" } else { "" };
                println!("   {} {}%{}", branch.name, branch.ratio, marker);
            }
        }

        println!();
        println!("✍️  SIGN-OFFS:");
        for sign_off in required_sign_offs(&experiment) {
            let mark = if experiment.sign_offs.contains(&sign_off) { "✅" } else { "⬜" };
            println!("   {mark} {}", sign_off.label());
        }
        let missing = missing_sign_offs(&experiment);
        if !missing.is_empty() && experiment.status == Status::Review {
            println!("   ⏳ {} sign-off(s) outstanding", missing.len());
        }

        let delivery = &experiment.delivery;
        if delivery.slug.is_some() || delivery.recipe_id.is_some() {
            println!();
            println!("🚚 DELIVERY:");
            if let Some(slug) = &delivery.slug {
                println!("   🔖 Slug: {slug}");
            }
            if let Some(id) = delivery.recipe_id {
                println!("   🧾 Recipe: {id}");
            }
            if !delivery.other_recipe_ids.is_empty() {
                let others: Vec<String> = delivery.other_recipe_ids.iter().map(u64::to_string).collect();
                println!("   🧾 Other recipes: {}", others.join(", "));
            }
            if delivery.enrollment_paused {
                println!("   ⏸️  Enrollment paused");
            }
        }

        if !experiment.subscribers.is_empty() {
            println!();
            let subscribers: Vec<&str> = experiment.subscribers.iter().map(UserId::as_str).collect();
            println!("🔔 Subscribers: {}", subscribers.join(", "));
        }
        Ok(())
    }
}

pub struct ListCommand {
    pub filter: ListFilter,
}

impl Command for ListCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let experiments = ctx.service.list(&self.filter).await?;
        if ctx.json {
            return ctx.print_json(&experiments);
        }
        if experiments.is_empty() {
            println!("📋 No experiments found");
            println!("   💡 Draft one with: experimenter create \"My Experiment\"");
            return Ok(());
        }

        println!("📋 EXPERIMENTS ({}):", experiments.len());
        for summary in &experiments {
            let archived = if summary.archived { " 🗄️" } else { "" };
            println!(
                "   {:<40} {:<12} {:<10} {}{}",
                summary.slug,
                summary.status.label(),
                summary.kind.as_str(),
                summary.name,
                archived
            );
        }
        Ok(())
    }
}

pub struct SectionsCommand {
    pub slug: String,
}

impl Command for SectionsCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let experiment = ctx.service.get(&self.slug).await?;
        let reports = section_reports(&experiment);
        if ctx.json {
            return ctx.print_json(&reports);
        }

        println!("📋 SECTIONS for {}:", experiment.slug);
        for report in &reports {
            let mark = match (report.complete, report.required) {
                (true, _) => "✅",
                (false, true) => "❌",
                (false, false) => "⬜",
            };
            println!("   {mark} {report}");
        }

        let blocking = reports.iter().filter(|r| r.required && !r.complete).count();
        println!();
        if blocking == 0 {
            println!("🚀 Ready for review");
        } else {
            println!("⏳ {blocking} required section(s) incomplete");
        }
        Ok(())
    }
}

pub struct HistoryCommand {
    pub slug: String,
}

impl Command for HistoryCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let experiment = ctx.service.get(&self.slug).await?;
        if ctx.json {
            return ctx.print_json(experiment.history.entries());
        }

        println!("📜 HISTORY for {}:", experiment.slug);
        for day in grouped_history(&experiment.history) {
            println!();
            println!("📅 {}", day.date);
            for user in &day.users {
                println!("   👤 {}", user.user);
                for entry in &user.entries {
                    println!("      {} {}", entry.changed_on.format("%H:%M"), entry.summary());
                    for change in entry.changed_values.values() {
                        println!("         • {}", describe_change(change));
                    }
                }
            }
        }
        Ok(())
    }
}

fn render_value(value: &Option<Value>) -> String {
    match value {
        None => "(empty)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn describe_change(change: &FieldChange) -> String {
    format!(
        "{}: {} → {}",
        change.display_name,
        render_value(&change.old_value),
        render_value(&change.new_value)
    )
}

/// Filter for `list`, resolving `--subscribed` against the acting user
pub fn list_filter(
    include_archived: bool,
    status: Option<Status>,
    kind: Option<ExperimentKind>,
    owner: Option<String>,
    subscriber: Option<&UserId>,
) -> ListFilter {
    ListFilter {
        include_archived,
        status,
        kind,
        owner: owner.map(UserId::new),
        subscriber: subscriber.cloned(),
    }
}
