use crate::apply::ApplyArgs;
use crate::inspect::InspectArgs;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "MLLR speaker adaptation toolchain", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load an acoustic model and print a summary
    Inspect(InspectArgs),

    /// Apply an MLLR transform file to a model's means
    Apply(ApplyArgs),
}
