//! shipit CLI: single-pass release-and-deploy pipeline runner.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shipit")]
#[command(about = "Release-and-deploy pipeline runner", long_about = None)]
struct Cli {
    /// Pipeline configuration file
    #[arg(long, env = "SHIPIT_CONFIG", default_value = "shipit.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the full pipeline: auth, version, release, image, deploy
    Run,
    /// Resolve the version and print the run plan without side effects
    Plan,
    /// Preflight checks: configuration, version marker, git, docker daemon
    Check,
    /// Resolve and print the version marker
    Version,
    /// Exchange app credentials and print the token expiry
    Auth,
    /// Publish the release for the current version marker
    Release,
    /// Build the image and push the three-tag set
    Image,
    /// Request a rollout of an explicit commit-tagged image reference
    Deploy {
        /// Image reference (registry/repository:commit-hash)
        #[arg(long)]
        image: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => commands::run::execute(&cli.config).await,
        Commands::Plan => commands::plan::show(&cli.config),
        Commands::Check => commands::check::preflight(&cli.config).await,
        Commands::Version => commands::stages::version(&cli.config),
        Commands::Auth => commands::stages::auth(&cli.config).await,
        Commands::Release => commands::stages::release(&cli.config).await,
        Commands::Image => commands::stages::image(&cli.config).await,
        Commands::Deploy { image } => commands::stages::deploy(&cli.config, &image).await,
    };

    if let Err(error) = result {
        eprintln!("error: {error:#}");
        std::process::exit(exit_code(&error));
    }
}

/// Map pipeline failures to their distinct exit codes; everything else is 1.
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<shipit_core::Error>()
        .map(|e| e.exit_code())
        .unwrap_or(1)
}
