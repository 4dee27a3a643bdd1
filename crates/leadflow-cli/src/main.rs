mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    attempt::AttemptSubcommand, config::ConfigSubcommand, event::EventSubcommand,
    lead::LeadSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "leadflow",
    about = "Outbound lead sequencing: scoring, daily-capped outreach, opt-outs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .leadflow/)
    #[arg(long, global = true, env = "LEADFLOW_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a leadflow project in the current directory
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Add, list, inspect and close leads
    Lead {
        #[command(subcommand)]
        subcommand: LeadSubcommand,
    },

    /// Record and list engagement events
    Event {
        #[command(subcommand)]
        subcommand: EventSubcommand,
    },

    /// Stop outreach to a lead
    Optout {
        /// Lead id
        lead_id: u64,
        /// Only stop this channel (email, sms, call)
        #[arg(long)]
        channel: Option<String>,
        /// Why the lead opted out
        #[arg(long, default_value = "requested")]
        reason: String,
    },

    /// Run one scheduling pass: dispatch every due step the caps allow
    Tick {
        /// Accept every attempt locally instead of calling the relay
        #[arg(long)]
        dry_run: bool,
        /// Evaluate as of this RFC 3339 instant instead of the current time
        #[arg(long)]
        now: Option<String>,
    },

    /// Show steps that are due, in dispatch order, without sending anything
    Due {
        /// Evaluate as of this RFC 3339 instant instead of the current time
        #[arg(long)]
        now: Option<String>,
    },

    /// Inspect outreach attempts
    Attempt {
        #[command(subcommand)]
        subcommand: AttemptSubcommand,
    },

    /// Pipeline summary and today's channel usage
    Stats,

    /// Inspect and validate .leadflow/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Tick { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref(), cli.json),
        Commands::Lead { subcommand } => cmd::lead::run(&root, subcommand, cli.json),
        Commands::Event { subcommand } => cmd::event::run(&root, subcommand, cli.json),
        Commands::Optout {
            lead_id,
            channel,
            reason,
        } => cmd::optout::run(&root, lead_id, channel.as_deref(), &reason, cli.json),
        Commands::Tick { dry_run, now } => cmd::tick::run(&root, dry_run, now.as_deref(), cli.json),
        Commands::Due { now } => cmd::due::run(&root, now.as_deref(), cli.json),
        Commands::Attempt { subcommand } => cmd::attempt::run(&root, subcommand, cli.json),
        Commands::Stats => cmd::stats::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
