//! Gauss-Newton operator assembly.
//!
//! For a voxel at offset `d = (dz, dy, dx)` from Phi's centre, with reference
//! gradient `g` and residual `r = ref - warped`, the linearized residual is
//! `r - sum_ij g_i dPhi_ij d_j - sum_i g_i dPhi_i3`. The coefficient vector
//! `c[4i + j] = g_i d_j`, `c[4i + 3] = g_i` matches the row-major layout of
//! the 3x4 correction, so `M = sum c c^T` and `A = sum c r`.

use std::ops::Add;

use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::consts::{PARALLEL_VOXEL_THRESHOLD, PLANAR_PARAMETERS, SINGULAR_RCOND};
use crate::volume::Gradients;

/// Normal-equation system `M dPhi = A` for one iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalEquations {
    pub m: SMatrix<f64, 12, 12>,
    pub a: SVector<f64, 12>,
    /// Number of voxels that contributed.
    pub voxels: usize,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self::zeros()
    }
}

impl NormalEquations {
    pub fn zeros() -> Self {
        Self {
            m: SMatrix::zeros(),
            a: SVector::zeros(),
            voxels: 0,
        }
    }

    #[inline]
    fn accumulate(&mut self, g: [f32; 3], d: [f64; 3], residual: f64) {
        let mut c = SVector::<f64, 12>::zeros();
        for i in 0..3 {
            let gi = g[i] as f64;
            c[4 * i] = gi * d[0];
            c[4 * i + 1] = gi * d[1];
            c[4 * i + 2] = gi * d[2];
            c[4 * i + 3] = gi;
        }
        self.m.ger(1.0, &c, &c, 1.0);
        self.a.axpy(residual, &c, 1.0);
        self.voxels += 1;
    }

    /// Solve for the 12 correction parameters. Planar systems only solve the
    /// six in-plane parameters; the rest stay zero. `None` when M is singular.
    pub fn solve(&self, planar: bool) -> Option<[f64; 12]> {
        let indices: Vec<usize> = if planar {
            PLANAR_PARAMETERS.to_vec()
        } else {
            (0..12).collect()
        };
        let n = indices.len();

        let m = DMatrix::from_fn(n, n, |r, c| self.m[(indices[r], indices[c])]);
        let a = DVector::from_fn(n, |r, _| self.a[indices[r]]);

        let svd = m.svd(true, true);
        let s_max = svd.singular_values.max();
        let s_min = svd.singular_values.min();
        if !(s_max > 0.0) || s_min / s_max < SINGULAR_RCOND {
            return None;
        }
        let x = svd.solve(&a, 0.0).ok()?;

        let mut delta = [0.0; 12];
        for (k, &i) in indices.iter().enumerate() {
            delta[i] = x[k];
        }
        Some(delta)
    }
}

impl Add for NormalEquations {
    type Output = NormalEquations;

    fn add(self, rhs: NormalEquations) -> NormalEquations {
        NormalEquations {
            m: self.m + rhs.m,
            a: self.a + rhs.a,
            voxels: self.voxels + rhs.voxels,
        }
    }
}

/// Builds M and A from the reference crop, its gradients and the currently
/// warped moving crop. Voxels where any input is non-finite are skipped.
pub trait OperatorAssembler: Send + Sync {
    fn name(&self) -> &str;

    /// `centre` is Phi's centre in the crop's own voxel coordinates.
    fn assemble(
        &self,
        reference: &ArrayView3<'_, f32>,
        warped: &ArrayView3<'_, f32>,
        gradients: &Gradients,
        centre: [f64; 3],
    ) -> NormalEquations;
}

/// CPU assembler; reduces per-row partial systems with Rayon above
/// [`PARALLEL_VOXEL_THRESHOLD`] voxels.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuAssembler;

impl OperatorAssembler for CpuAssembler {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn assemble(
        &self,
        reference: &ArrayView3<'_, f32>,
        warped: &ArrayView3<'_, f32>,
        gradients: &Gradients,
        centre: [f64; 3],
    ) -> NormalEquations {
        if reference.len() >= PARALLEL_VOXEL_THRESHOLD {
            assemble_parallel(reference, warped, gradients, centre)
        } else {
            assemble_sequential(reference, warped, gradients, centre)
        }
    }
}

pub fn create_assembler() -> Box<dyn OperatorAssembler> {
    Box::new(CpuAssembler)
}

pub fn assemble_sequential(
    reference: &ArrayView3<'_, f32>,
    warped: &ArrayView3<'_, f32>,
    gradients: &Gradients,
    centre: [f64; 3],
) -> NormalEquations {
    let (nz, ny, _) = reference.dim();
    let mut ne = NormalEquations::zeros();
    for z in 0..nz {
        for y in 0..ny {
            accumulate_row(&mut ne, reference, warped, gradients, centre, z, y);
        }
    }
    ne
}

pub fn assemble_parallel(
    reference: &ArrayView3<'_, f32>,
    warped: &ArrayView3<'_, f32>,
    gradients: &Gradients,
    centre: [f64; 3],
) -> NormalEquations {
    let (nz, ny, _) = reference.dim();
    (0..nz * ny)
        .into_par_iter()
        .fold(NormalEquations::zeros, |mut ne, row| {
            accumulate_row(&mut ne, reference, warped, gradients, centre, row / ny, row % ny);
            ne
        })
        .reduce(NormalEquations::zeros, |a, b| a + b)
}

fn accumulate_row(
    ne: &mut NormalEquations,
    reference: &ArrayView3<'_, f32>,
    warped: &ArrayView3<'_, f32>,
    gradients: &Gradients,
    centre: [f64; 3],
    z: usize,
    y: usize,
) {
    let nx = reference.dim().2;
    let dz = z as f64 - centre[0];
    let dy = y as f64 - centre[1];
    for x in 0..nx {
        let r = reference[[z, y, x]];
        let w = warped[[z, y, x]];
        let g = gradients.at([z, y, x]);
        if !(r.is_finite() && w.is_finite() && g.iter().all(|v| v.is_finite())) {
            continue;
        }
        let d = [dz, dy, x as f64 - centre[2]];
        ne.accumulate(g, d, (r - w) as f64);
    }
}
