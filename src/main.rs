use anyhow::Result;
use clap::Parser;

use experiment_workflow::cli::commands::create::{CloneCommand, CreateCommand};
use experiment_workflow::cli::commands::delivery::{RecipeCommand, RecordDeliveryCommand, SyncCommand};
use experiment_workflow::cli::commands::edit::{BranchesCommand, EditCommand, SignOffCommand};
use experiment_workflow::cli::commands::lifecycle::{AdvanceCommand, ArchiveCommand, SubscribeCommand};
use experiment_workflow::cli::commands::show::{
    list_filter, HistoryCommand, ListCommand, SectionsCommand, ShowCommand,
};
use experiment_workflow::cli::commands::{show_getting_started, Command, CommandContext};
use experiment_workflow::cli::{Cli, Commands};
use experiment_workflow::config::{self, ExperimenterConfig};
use experiment_workflow::{init_config, init_telemetry, workflow_metrics};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            ExperimenterConfig::load_env_file()?;
            ExperimenterConfig::load_from(path)?
        }
        None => {
            init_config()?;
            config::config()?.clone()
        }
    };

    init_telemetry(&config.observability)?;
    workflow_metrics().set_enabled(config.observability.metrics_enabled);

    let Some(command) = cli.command else {
        return show_getting_started().await;
    };

    let ctx = CommandContext::open(config, cli.store, cli.user, cli.permissions, cli.json).await?;

    let result = match command {
        Commands::Create { name, kind } => CreateCommand::new(name, kind).execute(&ctx).await,
        Commands::Show { slug } => ShowCommand { slug }.execute(&ctx).await,
        Commands::List {
            archived,
            status,
            kind,
            owner,
            subscribed,
        } => {
            let subscriber = if subscribed { ctx.user() } else { None };
            let filter = list_filter(archived, status, kind, owner, subscriber);
            ListCommand { filter }.execute(&ctx).await
        }
        Commands::Sections { slug } => SectionsCommand { slug }.execute(&ctx).await,
        Commands::Advance { slug, to } => AdvanceCommand { slug, target: to }.execute(&ctx).await,
        Commands::SignOff { slug, set, clear } => {
            SignOffCommand { slug, set, clear }.execute(&ctx).await
        }
        Commands::Edit { slug, file } => EditCommand { slug, file }.execute(&ctx).await,
        Commands::Branches { slug, file } => BranchesCommand { slug, file }.execute(&ctx).await,
        Commands::Archive { slug } => {
            ArchiveCommand { slug, archived: true }.execute(&ctx).await
        }
        Commands::Unarchive { slug } => {
            ArchiveCommand { slug, archived: false }.execute(&ctx).await
        }
        Commands::Subscribe { slug } => {
            SubscribeCommand { slug, subscribe: true }.execute(&ctx).await
        }
        Commands::Unsubscribe { slug } => {
            SubscribeCommand { slug, subscribe: false }.execute(&ctx).await
        }
        Commands::Clone { slug, name } => CloneCommand::new(slug, name).execute(&ctx).await,
        Commands::History { slug } => HistoryCommand { slug }.execute(&ctx).await,
        Commands::Recipe { slug } => RecipeCommand { slug }.execute(&ctx).await,
        Commands::RecordDelivery {
            slug,
            recipe_id,
            others,
        } => {
            RecordDeliveryCommand {
                slug,
                recipe_id,
                others,
            }
            .execute(&ctx)
            .await
        }
        Commands::Sync { slug } => SyncCommand { slug }.execute(&ctx).await,
    };

    workflow_metrics().log_stats();
    result
}
