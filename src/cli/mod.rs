use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::experiment::{ExperimentKind, Permission, SignOff, Status};

pub mod commands;

#[derive(Parser)]
#[command(name = "experimenter")]
#[command(about = "Experiment review workflow: drafting, sign-off, shipping and history")]
#[command(long_about = "Experimenter tracks product experiments from Draft through Review, Ship, \
                       Accepted and Live to Complete. Every change is recorded in the experiment's \
                       change log. Start with 'experimenter create' to draft a new experiment.")]
pub struct Cli {
    /// Email of the person running the command
    #[arg(long, global = true, env = "EXPERIMENTER_USER", help = "Acting user (email)")]
    pub user: Option<String>,

    /// Permissions held by the acting user
    #[arg(long = "permission", global = true, value_name = "PERMISSION", help = "Grant a permission: qa-sign-off or relman-sign-off")]
    pub permissions: Vec<Permission>,

    /// Override the experiment store directory
    #[arg(long, global = true, value_name = "DIR", help = "Directory holding experiment files")]
    pub store: Option<PathBuf>,

    /// Read configuration from this file instead of experimenter.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print machine readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Draft a new experiment
    Create {
        /// Experiment name; its slug must be unique
        name: String,
        /// Experiment type
        #[arg(long, default_value = "pref", help = "Experiment type: pref, addon or generic")]
        kind: ExperimentKind,
    },
    /// Show one experiment
    Show {
        slug: String,
    },
    /// List experiments
    List {
        /// Include archived experiments
        #[arg(long)]
        archived: bool,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        kind: Option<ExperimentKind>,
        /// Only experiments owned by this user
        #[arg(long)]
        owner: Option<String>,
        /// Only experiments the acting user is subscribed to
        #[arg(long)]
        subscribed: bool,
    },
    /// Show which sections are complete and what is missing
    Sections {
        slug: String,
    },
    /// Move an experiment to another status
    Advance {
        slug: String,
        /// Target status (defaults to the next status in process order)
        #[arg(long)]
        to: Option<Status>,
    },
    /// Set or clear review sign-offs
    SignOff {
        slug: String,
        /// Sign-offs to set
        #[arg(long = "set", value_name = "SIGN_OFF")]
        set: Vec<SignOff>,
        /// Sign-offs to clear
        #[arg(long = "clear", value_name = "SIGN_OFF")]
        clear: Vec<SignOff>,
    },
    /// Apply a section edit from a JSON file
    Edit {
        slug: String,
        #[arg(long, help = "JSON file with a \"section\" tag and the section's fields")]
        file: PathBuf,
    },
    /// Replace the branch list from a JSON file
    Branches {
        slug: String,
        #[arg(long, help = "JSON file with an array of branches")]
        file: PathBuf,
    },
    /// Archive an experiment
    Archive {
        slug: String,
    },
    /// Restore an archived experiment
    Unarchive {
        slug: String,
    },
    /// Follow changes to an experiment
    Subscribe {
        slug: String,
    },
    /// Stop following an experiment
    Unsubscribe {
        slug: String,
    },
    /// Copy an experiment's content into a new Draft
    Clone {
        slug: String,
        /// Name of the copy
        name: String,
    },
    /// Show the change log grouped by day and user
    History {
        slug: String,
    },
    /// Print the delivery recipe for a shipped experiment
    Recipe {
        slug: String,
    },
    /// Record the delivery recipe ids for an experiment
    RecordDelivery {
        slug: String,
        /// Primary recipe id
        recipe_id: u64,
        /// Additional recipe ids
        #[arg(long = "other", value_name = "RECIPE_ID")]
        others: Vec<u64>,
    },
    /// Reconcile status with what the delivery system reports
    Sync {
        slug: String,
    },
}
