mod commands;
mod input;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "correl", about = "Sub-pixel digital image correlation")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the operator Phi mapping a reference image onto a moving image
    Register(commands::register::RegisterArgs),
    /// Register coarse-to-fine on a binning pyramid
    Multiscale(commands::multiscale::MultiscaleArgs),
    /// Measure nodal displacements on a regular tetrahedral mesh
    Global(commands::global::GlobalArgs),
    /// Find the best integer displacement by exhaustive search
    PixelSearch(commands::pixel_search::PixelSearchArgs),
    /// Print or save a default configuration as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Register(args) => commands::register::run(args),
        Commands::Multiscale(args) => commands::multiscale::run(args),
        Commands::Global(args) => commands::global::run(args),
        Commands::PixelSearch(args) => commands::pixel_search::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
