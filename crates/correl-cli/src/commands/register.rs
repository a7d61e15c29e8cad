use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use correl_core::io::{save_image, write_raw_volume};
use correl_core::register::{register, RegistrationConfig, RegistrationResult};
use correl_core::resample::{create_resampler, Interpolation, SamplingGrid};
use correl_core::transform::Phi;
use correl_core::volume::{centre, Margin, Mask, Volume};

use crate::input::{load_config, load_mask, load_volume, parse_triple};

#[derive(Clone, Copy, ValueEnum)]
pub enum InterpolationArg {
    Nearest,
    Linear,
    Cubic,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Nearest => Interpolation::Nearest,
            InterpolationArg::Linear => Interpolation::Linear,
            InterpolationArg::Cubic => Interpolation::Cubic,
        }
    }
}

/// Inputs and knobs shared by `register` and `multiscale`.
#[derive(Args)]
pub struct RegistrationOptions {
    /// Reference image (TIFF, PNG or .raw f32)
    pub reference: PathBuf,

    /// Moving image (TIFF, PNG or .raw f32)
    pub moving: PathBuf,

    /// Shape z,y,x of .raw inputs
    #[arg(long)]
    pub shape: Option<String>,

    /// Mask on the reference image; non-zero voxels are excluded
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Registration config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Margin in voxels removed from the reference image
    #[arg(long)]
    pub margin: Option<usize>,

    /// Newton-Raphson iteration budget
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Convergence threshold on the norm of the Phi correction
    #[arg(long)]
    pub delta_phi_min: Option<f64>,

    /// Interpolation used to warp the moving image
    #[arg(long, value_enum)]
    pub interpolation: Option<InterpolationArg>,

    /// Only solve for rotation and translation
    #[arg(long)]
    pub rigid: bool,

    /// Initial translation z,y,x (e.g. from pixel-search)
    #[arg(long)]
    pub init_translation: Option<String>,

    /// Write the moving image warped onto the reference
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RegistrationOptions {
    /// Apply command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut RegistrationConfig) {
        if let Some(m) = self.margin {
            config.margin = Some(Margin::uniform(m));
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(d) = self.delta_phi_min {
            config.delta_phi_min = d;
        }
        if let Some(i) = self.interpolation {
            config.interpolation = i.into();
        }
        if self.rigid {
            config.rigid = true;
        }
    }

    pub fn load(&self) -> Result<(Volume, Volume, Option<Mask>)> {
        let shape = self.shape.as_deref();
        let reference = load_volume(&self.reference, shape)?;
        let moving = load_volume(&self.moving, shape)?;
        let mask = self
            .mask
            .as_ref()
            .map(|p| load_mask(p, shape))
            .transpose()?;
        Ok((reference, moving, mask))
    }

    pub fn initial_phi(&self) -> Result<Option<Phi>> {
        self.init_translation
            .as_deref()
            .map(|t| -> Result<Phi> {
                Ok(Phi::from_translation(parse_triple(t, "initial translation")?))
            })
            .transpose()
    }

    /// Write `moving` pulled back through `result.phi` onto the reference grid.
    pub fn write_output(
        &self,
        reference: &Volume,
        moving: &Volume,
        result: &RegistrationResult,
        interpolation: Interpolation,
    ) -> Result<()> {
        let Some(path) = &self.output else {
            return Ok(());
        };
        let (nz, ny, nx) = reference.dim();
        let c1 = centre([nz, ny, nx]);
        let (mz, my, mx) = moving.dim();
        let c2 = centre([mz, my, mx]);
        let pc = result.phi_centre;
        let grid = SamplingGrid {
            shape: [nz, ny, nx],
            origin: [-pc[0], -pc[1], -pc[2]],
            source_centre: [
                pc[0] + c2[0] - c1[0],
                pc[1] + c2[1] - c1[1],
                pc[2] + c2[2] - c1[2],
            ],
        };
        let warped =
            create_resampler(interpolation).resample(&moving.view(), &result.phi, &grid);
        save_volume(&warped, path)?;
        println!("Saved to {}", path.display());
        Ok(())
    }
}

pub fn save_volume(volume: &Volume, path: &Path) -> Result<()> {
    let saved = if path.extension().and_then(|e| e.to_str()) == Some("raw") {
        write_raw_volume(volume, path)
    } else {
        save_image(volume, path)
    };
    saved.with_context(|| format!("Failed to write {}", path.display()))
}

#[derive(Args)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub options: RegistrationOptions,
}

pub fn run(args: &RegisterArgs) -> Result<()> {
    let options = &args.options;
    let mut config: RegistrationConfig = match &options.config {
        Some(path) => load_config(path)?,
        None => RegistrationConfig::default(),
    };
    options.apply(&mut config);

    let (reference, moving, mask) = options.load()?;
    println!(
        "Loaded reference {:?} and moving {:?}",
        reference.dim(),
        moving.dim()
    );

    let phi_init = options.initial_phi()?;
    let pb = super::spinner("Registering")?;
    let result = register(&reference, &moving, mask.as_ref(), phi_init.as_ref(), &config);
    pb.finish_and_clear();
    let result = result.context("Registration failed")?;

    crate::summary::print_registration_summary(&result);
    options.write_output(&reference, &moving, &result, config.interpolation)
}
