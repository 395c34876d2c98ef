mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, gate::GateSubcommand, run::DispatchExit,
    session::SessionSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "volley",
    about = "Schedule timed actions so that a whole batch lands at one instant",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .volley/)
    #[arg(long, global = true, env = "VOLLEY_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .volley/, a default config and an example attacks.json
    Init,

    /// Load a schedule file and merge it into the stored schedule
    Load {
        /// Schedule file (default: attacks.json in the project root)
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// List pending batches and when they activate
    List {
        /// Add per-request travel estimates and earliest reachable completion
        #[arg(long)]
        estimate: bool,
    },

    /// Run the next batch inside the activation horizon, if any
    RunOnce,

    /// Run the control loop until Ctrl-C
    Run {
        /// Schedule file to merge in before starting
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// Inspect or clear the challenge sentinel
    Gate {
        #[command(subcommand)]
        subcommand: GateSubcommand,
    },

    /// Manage the stored browser session cookie
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::RunOnce => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Load { file } => cmd::load::run(&root, file.as_deref(), cli.json),
        Commands::List { estimate } => cmd::list::run(&root, estimate, cli.json),
        Commands::RunOnce => cmd::run::run_once(&root, cli.json),
        Commands::Run { file } => cmd::run::run_loop(&root, file.as_deref(), cli.json),
        Commands::Gate { subcommand } => cmd::gate::run(&root, subcommand, cli.json),
        Commands::Session { subcommand } => cmd::session::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<DispatchExit>()
            .map_or(1, DispatchExit::exit_code);
        std::process::exit(code);
    }
}
