mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, plugin::PluginSubcommand, registry::RegistrySubcommand,
    workspace::WorkspaceSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "aiwg",
    about = "Install, remove and audit framework plugins, and migrate project workspaces",
    version,
    propagate_version = true
)]
struct Cli {
    /// Plugin root (default: ~/.local/share/aiwg)
    #[arg(long, global = true, env = "AIWG_ROOT")]
    root: Option<PathBuf>,

    /// Project containing the .aiwg/ workspace (default: auto-detect from .aiwg/ or .git/)
    #[arg(long, global = true, env = "AIWG_PROJECT")]
    project: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install, remove and inspect plugins
    Plugin {
        #[command(subcommand)]
        subcommand: PluginSubcommand,
    },

    /// Check the registry against the filesystem
    Registry {
        #[command(subcommand)]
        subcommand: RegistrySubcommand,
    },

    /// Detect, migrate and merge the project's .aiwg/ workspace
    Workspace {
        #[command(subcommand)]
        subcommand: WorkspaceSubcommand,
    },

    /// Inspect and validate the root configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Shorthand for `plugin status`
    Status,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = root::resolve_root(cli.root.as_deref()).and_then(|root| match cli.command {
        Commands::Plugin { subcommand } => cmd::plugin::run(&root, subcommand, cli.json),
        Commands::Registry { subcommand } => cmd::registry::run(&root, subcommand, cli.json),
        Commands::Workspace { subcommand } => {
            let project = root::resolve_project(cli.project.as_deref());
            cmd::workspace::run(&root, &project, subcommand, cli.json)
        }
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Status => {
            cmd::plugin::run(&root, PluginSubcommand::Status { id: None }, cli.json)
        }
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
