use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use am_engine::{LoaderConfig, LogMath, ModelLoader};

use crate::cluster::ClusterMap;
use crate::transform::Transform;
use crate::transformer;

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Model directory (holds means, variances, mdef, ...)
    #[arg(long)]
    pub model: PathBuf,

    /// MLLR transform file to apply
    #[arg(long)]
    pub transform: PathBuf,

    /// Where to write the adapted means file
    #[arg(long, default_value = "means.adapted")]
    pub output: PathBuf,
}

pub fn run(args: ApplyArgs) -> Result<()> {
    let config = LoaderConfig::new(&args.model);
    let store = ModelLoader::new(config, LogMath::new()).load()?;

    let transform = Transform::load(&args.transform)?;
    // The regression clustering is deterministic, so rebuilding it with the
    // transform's class count reproduces the estimation-time map.
    let cluster = ClusterMap::build(
        store.means_pool(),
        transform.num_classes(),
        ClusterMap::DEFAULT_MAX_ITERATIONS,
    )?;

    let adapted = transformer::apply_transform(&store, &cluster, &transform)?;
    transformer::write_means(&store, &adapted, &args.output)?;

    println!(
        "Adapted {} means with {} regression classes -> {}",
        adapted.len(),
        transform.num_classes(),
        args.output.display()
    );
    Ok(())
}
