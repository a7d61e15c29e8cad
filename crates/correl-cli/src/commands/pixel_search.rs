use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use correl_core::search::{pixel_search, PixelSearchConfig, SearchRange};

use crate::input::{load_config, load_mask, load_volume, parse_triple};

#[derive(Args)]
pub struct PixelSearchArgs {
    /// Reference sub-image
    pub reference: PathBuf,

    /// Search image, at least as large as the reference
    pub search: PathBuf,

    /// Shape z,y,x of .raw inputs
    #[arg(long)]
    pub shape: Option<String>,

    /// Shape z,y,x of a .raw search image, if different from --shape
    #[arg(long)]
    pub search_shape: Option<String>,

    /// Mask on the reference sub-image; non-zero voxels are excluded
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Pixel search config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Symmetric search radius z,y,x
    #[arg(long)]
    pub radius: Option<String>,

    /// Point z,y,x of the search image to centre the reference on
    #[arg(long)]
    pub centre: Option<String>,
}

pub fn run(args: &PixelSearchArgs) -> Result<()> {
    let mut config: PixelSearchConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => PixelSearchConfig::default(),
    };
    if let Some(r) = &args.radius {
        config.search_range = SearchRange::symmetric(parse_triple(r, "radius")?);
    }
    if let Some(c) = &args.centre {
        config.search_centre = Some(parse_triple(c, "centre")?);
    }

    let shape = args.shape.as_deref();
    let reference = load_volume(&args.reference, shape)?;
    let search = load_volume(&args.search, args.search_shape.as_deref().or(shape))?;
    let mask = args.mask.as_ref().map(|p| load_mask(p, shape)).transpose()?;

    let result = pixel_search(
        reference.view(),
        search.view(),
        mask.as_ref().map(|m| m.view()),
        &config,
    )
    .context("Pixel search failed")?;

    crate::summary::print_pixel_search_summary(&result);
    Ok(())
}
