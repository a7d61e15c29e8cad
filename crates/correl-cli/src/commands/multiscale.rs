use anyhow::{Context, Result};
use clap::Args;
use correl_core::register::{register_multiscale, MultiscaleConfig};

use super::register::RegistrationOptions;
use crate::input::load_config;

#[derive(Args)]
pub struct MultiscaleArgs {
    #[command(flatten)]
    pub options: RegistrationOptions,

    /// Coarsest binning factor (rounded to a power of two)
    #[arg(long)]
    pub max_binning: Option<usize>,
}

pub fn run(args: &MultiscaleArgs) -> Result<()> {
    let options = &args.options;
    let mut config: MultiscaleConfig = match &options.config {
        Some(path) => load_config(path)?,
        None => MultiscaleConfig::default(),
    };
    options.apply(&mut config.registration);
    if let Some(b) = args.max_binning {
        config.max_binning = b;
    }

    let (reference, moving, mask) = options.load()?;
    println!(
        "Loaded reference {:?} and moving {:?}, binning {}",
        reference.dim(),
        moving.dim(),
        config.max_binning
    );

    let phi_init = options.initial_phi()?;
    let pb = super::spinner("Registering")?;
    let result =
        register_multiscale(&reference, &moving, mask.as_ref(), phi_init.as_ref(), &config);
    pb.finish_and_clear();
    let result = result.context("Multiscale registration failed")?;

    crate::summary::print_registration_summary(&result);
    options.write_output(&reference, &moving, &result, config.registration.interpolation)
}
