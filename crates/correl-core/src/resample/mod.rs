//! Resampling of volumes under a transformation operator.
//!
//! A [`Resampler`] pulls values back through Phi: the output voxel at
//! reference position `x` receives `source(Phi x)`. Deforming an image by Phi
//! in the forward sense is therefore resampling with `Phi^-1`, see [`deform`].

mod kernel;

pub use kernel::{sample_at, Interpolation};

use ndarray::{Array3, ArrayView3, Zip};

use crate::consts::PARALLEL_VOXEL_THRESHOLD;
use crate::error::{CorrelError, Result};
use crate::transform::Phi;
use crate::volume::{centre, shape_of, Crop, Volume};

/// Output lattice of a resampling pass.
///
/// Output voxel `q` sits at `origin + q` relative to Phi's centre; the mapped
/// position is read from the source around `source_centre`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingGrid {
    pub shape: [usize; 3],
    pub origin: [f64; 3],
    pub source_centre: [f64; 3],
}

impl SamplingGrid {
    /// Whole-image grid with Phi acting about the image centre.
    pub fn full(shape: [usize; 3]) -> Self {
        let c = centre(shape);
        Self {
            shape,
            origin: [-c[0], -c[1], -c[2]],
            source_centre: c,
        }
    }

    /// Grid covering `crop` of a reference image whose Phi centre is
    /// `reference_centre`, reading a source centred on `source_centre`.
    pub fn region(crop: &Crop, reference_centre: [f64; 3], source_centre: [f64; 3]) -> Self {
        Self {
            shape: crop.shape,
            origin: [
                crop.start[0] as f64 - reference_centre[0],
                crop.start[1] as f64 - reference_centre[1],
                crop.start[2] as f64 - reference_centre[2],
            ],
            source_centre,
        }
    }

    /// Source position sampled for output voxel `q`.
    #[inline]
    pub fn source_position(&self, phi: &Phi, q: [usize; 3]) -> [f64; 3] {
        let m = &phi.0;
        let rel = [
            self.origin[0] + q[0] as f64,
            self.origin[1] + q[1] as f64,
            self.origin[2] + q[2] as f64,
        ];
        let mut pos = [0.0; 3];
        for (row, p) in pos.iter_mut().enumerate() {
            *p = self.source_centre[row]
                + m[(row, 0)] * rel[0]
                + m[(row, 1)] * rel[1]
                + m[(row, 2)] * rel[2]
                + m[(row, 3)];
        }
        pos
    }
}

/// Resampling strategy, selected once at construction.
pub trait Resampler: Send + Sync {
    fn name(&self) -> &str;

    fn interpolation(&self) -> Interpolation;

    /// Sample `source` at `Phi x` for every voxel `x` of `grid`. Positions the
    /// interpolation kernel cannot support come out as NaN.
    fn resample(&self, source: &ArrayView3<'_, f32>, phi: &Phi, grid: &SamplingGrid) -> Volume;
}

/// CPU resampler; switches to Rayon above [`PARALLEL_VOXEL_THRESHOLD`] voxels.
#[derive(Clone, Copy, Debug)]
pub struct CpuResampler {
    pub interpolation: Interpolation,
}

impl CpuResampler {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation }
    }
}

impl Resampler for CpuResampler {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    fn resample(&self, source: &ArrayView3<'_, f32>, phi: &Phi, grid: &SamplingGrid) -> Volume {
        if grid.shape.iter().product::<usize>() >= PARALLEL_VOXEL_THRESHOLD {
            resample_parallel(source, phi, grid, self.interpolation)
        } else {
            resample_sequential(source, phi, grid, self.interpolation)
        }
    }
}

/// Default resampler for an interpolation order.
pub fn create_resampler(interpolation: Interpolation) -> Box<dyn Resampler> {
    Box::new(CpuResampler::new(interpolation))
}

pub fn resample_sequential(
    source: &ArrayView3<'_, f32>,
    phi: &Phi,
    grid: &SamplingGrid,
    interpolation: Interpolation,
) -> Volume {
    let [nz, ny, nx] = grid.shape;
    Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| {
        sample_at(source, grid.source_position(phi, [z, y, x]), interpolation)
    })
}

pub fn resample_parallel(
    source: &ArrayView3<'_, f32>,
    phi: &Phi,
    grid: &SamplingGrid,
    interpolation: Interpolation,
) -> Volume {
    let [nz, ny, nx] = grid.shape;
    let mut out = Array3::<f32>::zeros((nz, ny, nx));
    Zip::indexed(&mut out).par_for_each(|(z, y, x), v| {
        *v = sample_at(source, grid.source_position(phi, [z, y, x]), interpolation);
    });
    out
}

/// Deform `image` by `phi` about its centre: `out(Phi x) = image(x)`.
pub fn deform(image: &ArrayView3<'_, f32>, phi: &Phi, interpolation: Interpolation) -> Result<Volume> {
    let inverse = phi
        .inverse()
        .ok_or_else(|| CorrelError::InvalidParameter("Phi is not invertible".into()))?;
    let grid = SamplingGrid::full(shape_of(image));
    Ok(CpuResampler::new(interpolation).resample(image, &inverse, &grid))
}
