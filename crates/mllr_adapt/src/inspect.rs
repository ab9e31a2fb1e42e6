use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use am_engine::{LoaderConfig, LogMath, ModelLoader};

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Model directory (holds means, variances, mdef, ...)
    #[arg(long)]
    pub model: PathBuf,

    /// HMM definition file name inside the model directory
    #[arg(long, default_value = "mdef")]
    pub mdef: String,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let mut config = LoaderConfig::new(&args.model);
    config.model_definition = args.mdef;
    let store = ModelLoader::new(config, LogMath::new()).load()?;

    println!("Model: {}", args.model.display());
    println!("  senones:             {}", store.num_senones());
    println!("  gaussians:           {}", store.means_pool().len());
    println!("  gaussians per state: {}", store.num_gaussians_per_state());
    println!("  streams:             {}", store.num_streams());
    println!("  dimension:           {}", store.gaussian_dimension());
    println!("  states per hmm:      {}", store.num_states_per_hmm());
    println!("  transition matrices: {}", store.transition_matrix_pool().len());
    println!("  ci units:            {}", store.context_independent_units().len());
    println!("  hmms:                {}", store.hmm_manager().len());
    println!(
        "  feature transform:   {}",
        if store.feature_transform().is_some() {
            "present"
        } else {
            "absent"
        }
    );
    Ok(())
}
