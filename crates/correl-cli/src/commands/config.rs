use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use correl_core::mesh::GlobalCorrelationConfig;
use correl_core::register::{MultiscaleConfig, RegistrationConfig};
use correl_core::search::PixelSearchConfig;

#[derive(Clone, Copy, ValueEnum)]
pub enum ConfigKind {
    Register,
    Multiscale,
    PixelSearch,
    Global,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Which configuration to print
    #[arg(long, value_enum, default_value = "multiscale")]
    pub kind: ConfigKind,

    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a default config as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let toml_str = match args.kind {
        ConfigKind::Register => toml::to_string_pretty(&RegistrationConfig::default())?,
        ConfigKind::Multiscale => toml::to_string_pretty(&MultiscaleConfig::default())?,
        ConfigKind::PixelSearch => toml::to_string_pretty(&PixelSearchConfig::default())?,
        ConfigKind::Global => toml::to_string_pretty(&GlobalCorrelationConfig::default())?,
    };

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
