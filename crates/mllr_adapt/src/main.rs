use anyhow::Result;
use clap::Parser;
use mllr_adapt::cli::{Cli, Commands};
use mllr_adapt::{apply, inspect};

fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect(args) => inspect::run(args)?,
        Commands::Apply(args) => apply::run(args)?,
    }
    Ok(())
}
