//! Finite-element global correlation.
//!
//! The unknowns are nodal displacements `u` interpolated linearly inside each
//! tetrahedron. Each iteration warps the moving image at `x + u(x)` for every
//! labelled voxel and assembles `K du = F` with `K = sum c c^T`,
//! `F = sum c r`, where `c[3a + i] = N_a g_i` (shape function times reference
//! gradient) and `r = ref - warped`.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::{self, CancelToken};
use crate::consts::{
    BC_PENALTY_FACTOR, DEFAULT_GLOBAL_CONVERGENCE, DEFAULT_GLOBAL_MAX_ITERATIONS, EPSILON,
    PARALLEL_VOXEL_THRESHOLD,
};
use crate::error::{CorrelError, Result};
use crate::resample::{sample_at, Interpolation};
use crate::volume::{is_planar, shape_of, Gradients, Volume};

use super::Mesh;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalCorrelationConfig {
    /// Stop once the norm of the displacement increment drops to this.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub interpolation: Interpolation,
}

fn default_convergence_threshold() -> f64 {
    DEFAULT_GLOBAL_CONVERGENCE
}

fn default_max_iterations() -> usize {
    DEFAULT_GLOBAL_MAX_ITERATIONS
}

impl Default for GlobalCorrelationConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: DEFAULT_GLOBAL_CONVERGENCE,
            max_iterations: DEFAULT_GLOBAL_MAX_ITERATIONS,
            interpolation: Interpolation::default(),
        }
    }
}

/// Prescribed displacement of one nodal degree of freedom.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    pub node: usize,
    /// 0 = z, 1 = y, 2 = x.
    pub axis: usize,
    pub displacement: f64,
}

impl BoundaryCondition {
    pub fn new(node: usize, axis: usize, displacement: f64) -> Self {
        Self {
            node,
            axis,
            displacement,
        }
    }

    fn dof(&self) -> usize {
        3 * self.node + self.axis
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalCorrelationResult {
    /// Nodal displacements, one `(z, y, x)` row per mesh node.
    pub displacements: Array2<f64>,
    pub iterations: usize,
    /// Norm of the last displacement increment.
    pub delta_norm: f64,
    pub converged: bool,
    /// Squared residual over labelled voxels, normalized by their intensity.
    pub error: f64,
}

/// Labelled voxel with its shape-function values, fixed for the whole run.
#[derive(Clone, Copy)]
struct Sample {
    index: [usize; 3],
    weights: [f64; 4],
}

struct CellSystem {
    k: SMatrix<f64, 12, 12>,
    f: SVector<f64, 12>,
}

/// Global correlation driver.
pub struct GlobalCorrelation {
    config: GlobalCorrelationConfig,
    cancel: Option<CancelToken>,
}

impl GlobalCorrelation {
    pub fn new(config: GlobalCorrelationConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Measure nodal displacements mapping `reference` onto `moving`.
    ///
    /// `labels` assigns each voxel to cell `label - 1` (0 = outside the mesh),
    /// see [`super::label_tetrahedra`]. Prescribed degrees of freedom in
    /// `boundary_conditions` hold exactly their given value in the result.
    pub fn run(
        &self,
        reference: ArrayView3<'_, f32>,
        moving: ArrayView3<'_, f32>,
        mesh: &Mesh,
        labels: ArrayView3<'_, u32>,
        initial: Option<ArrayView2<'_, f64>>,
        boundary_conditions: &[BoundaryCondition],
    ) -> Result<GlobalCorrelationResult> {
        let shape = shape_of(&reference);
        if is_planar(shape) {
            return Err(CorrelError::InvalidParameter(
                "global correlation requires a 3D image".into(),
            ));
        }
        if shape_of(&moving) != shape || shape_of(&labels) != shape {
            return Err(CorrelError::ShapeMismatch(format!(
                "reference {:?}, moving {:?} and labels {:?} must share a shape",
                shape,
                shape_of(&moving),
                shape_of(&labels)
            )));
        }

        let nodes = mesh.node_count();
        let mut u = match initial {
            Some(init) if init.dim() != (nodes, 3) => {
                return Err(CorrelError::ShapeMismatch(format!(
                    "initial displacements {:?} for {} nodes",
                    init.dim(),
                    nodes
                )));
            }
            Some(init) => init.to_owned(),
            None => Array2::zeros((nodes, 3)),
        };
        let prescribed = prescribed_dofs(boundary_conditions, nodes)?;

        let samples = collect_samples(mesh, &labels)?;
        let gradients = Gradients::of(&reference);
        let labelled: usize = samples.iter().map(Vec::len).sum();
        let intensity: f64 = samples
            .iter()
            .flatten()
            .map(|s| reference[s.index] as f64)
            .filter(|v| v.is_finite())
            .sum();
        let normalisation = if intensity.abs() < EPSILON { 1.0 } else { intensity };

        let warp = Warp {
            reference,
            moving,
            gradients: &gradients,
            interpolation: self.config.interpolation,
        };

        let mut iterations = 0usize;
        let mut delta_norm = f64::INFINITY;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            cancel::check(self.cancel.as_ref())?;
            iterations += 1;

            let cell_system = |(k, cell_samples): (usize, &Vec<Sample>)| {
                warp.cell_system(&mesh.cells[k], cell_samples, &u)
            };
            let systems: Vec<CellSystem> = if labelled >= PARALLEL_VOXEL_THRESHOLD {
                samples.par_iter().enumerate().map(cell_system).collect()
            } else {
                samples.iter().enumerate().map(cell_system).collect()
            };

            let (k, f) = scatter(mesh, &systems);
            let du = solve_partitioned(k, f, &prescribed, &u)?;

            for (dof, d) in du.iter().enumerate() {
                u[[dof / 3, dof % 3]] += d;
            }
            delta_norm = du.norm();
            debug!(iterations, delta_norm, "global correlation step");

            if delta_norm <= self.config.convergence_threshold {
                converged = true;
                break;
            }
        }

        let sse: f64 = mesh
            .cells
            .iter()
            .zip(&samples)
            .map(|(cell, cell_samples)| warp.cell_residual(cell, cell_samples, &u))
            .sum();
        let error = sse / normalisation;

        info!(
            iterations,
            delta_norm, converged, error, "global correlation finished"
        );

        Ok(GlobalCorrelationResult {
            displacements: u,
            iterations,
            delta_norm,
            converged,
            error,
        })
    }
}

/// Run global correlation without cancellation.
pub fn global_correlation(
    reference: &Volume,
    moving: &Volume,
    mesh: &Mesh,
    labels: &Array3<u32>,
    initial: Option<&Array2<f64>>,
    boundary_conditions: &[BoundaryCondition],
    config: &GlobalCorrelationConfig,
) -> Result<GlobalCorrelationResult> {
    GlobalCorrelation::new(config.clone()).run(
        reference.view(),
        moving.view(),
        mesh,
        labels.view(),
        initial.map(|d| d.view()),
        boundary_conditions,
    )
}

struct Warp<'a> {
    reference: ArrayView3<'a, f32>,
    moving: ArrayView3<'a, f32>,
    gradients: &'a Gradients,
    interpolation: Interpolation,
}

impl Warp<'_> {
    /// Reference value and warped moving value at one sample, `None` when
    /// either is non-finite.
    fn pair(&self, cell: &[usize; 4], sample: &Sample, u: &Array2<f64>) -> Option<(f64, f64)> {
        let mut pos = sample.index.map(|i| i as f64);
        for (a, &node) in cell.iter().enumerate() {
            for (axis, p) in pos.iter_mut().enumerate() {
                *p += sample.weights[a] * u[[node, axis]];
            }
        }
        let r = self.reference[sample.index];
        let w = sample_at(&self.moving, pos, self.interpolation);
        (r.is_finite() && w.is_finite()).then_some((r as f64, w as f64))
    }

    fn cell_system(&self, cell: &[usize; 4], samples: &[Sample], u: &Array2<f64>) -> CellSystem {
        let mut system = CellSystem {
            k: SMatrix::zeros(),
            f: SVector::zeros(),
        };
        for sample in samples {
            let Some((r, w)) = self.pair(cell, sample, u) else {
                continue;
            };
            let g = self.gradients.at(sample.index);
            if !g.iter().all(|v| v.is_finite()) {
                continue;
            }
            let mut c = SVector::<f64, 12>::zeros();
            for a in 0..4 {
                for i in 0..3 {
                    c[3 * a + i] = sample.weights[a] * g[i] as f64;
                }
            }
            system.k.ger(1.0, &c, &c, 1.0);
            system.f.axpy(r - w, &c, 1.0);
        }
        system
    }

    fn cell_residual(&self, cell: &[usize; 4], samples: &[Sample], u: &Array2<f64>) -> f64 {
        samples
            .iter()
            .filter_map(|s| self.pair(cell, s, u))
            .map(|(r, w)| (r - w) * (r - w))
            .sum()
    }
}

/// Group labelled voxels by cell and evaluate their shape functions once.
fn collect_samples(mesh: &Mesh, labels: &ArrayView3<'_, u32>) -> Result<Vec<Vec<Sample>>> {
    let maps = mesh.barycentric_maps();
    let mut samples = vec![Vec::new(); mesh.cell_count()];
    for ((z, y, x), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let k = label as usize - 1;
        if k >= samples.len() {
            return Err(CorrelError::InvalidParameter(format!(
                "label {} exceeds the {} mesh cells",
                label,
                samples.len()
            )));
        }
        let Some(map) = &maps[k] else {
            return Err(CorrelError::InvalidParameter(format!(
                "voxel ({}, {}, {}) is labelled with degenerate cell {}",
                z, y, x, k
            )));
        };
        let weights = mesh.shape_functions(k, map, [z as f64, y as f64, x as f64]);
        samples[k].push(Sample {
            index: [z, y, x],
            weights,
        });
    }
    Ok(samples)
}

/// Assemble the global system. Duplicate triplets are summed when the
/// matrix is compressed.
fn scatter(mesh: &Mesh, systems: &[CellSystem]) -> (CooMatrix<f64>, DVector<f64>) {
    let n = 3 * mesh.node_count();
    let mut k = CooMatrix::new(n, n);
    let mut f = DVector::zeros(n);
    for (cell, system) in mesh.cells.iter().zip(systems) {
        let dofs: [usize; 12] = std::array::from_fn(|l| 3 * cell[l / 3] + l % 3);
        for (lr, &gr) in dofs.iter().enumerate() {
            f[gr] += system.f[lr];
            for (lc, &gc) in dofs.iter().enumerate() {
                k.push(gr, gc, system.k[(lr, lc)]);
            }
        }
    }
    (k, f)
}

/// Map each prescribed DOF to its target value; later entries win.
fn prescribed_dofs(conditions: &[BoundaryCondition], nodes: usize) -> Result<BTreeMap<usize, f64>> {
    let mut prescribed = BTreeMap::new();
    for bc in conditions {
        if bc.node >= nodes || bc.axis > 2 {
            return Err(CorrelError::InvalidParameter(format!(
                "boundary condition on node {} axis {} for a mesh of {} nodes",
                bc.node, bc.axis, nodes
            )));
        }
        prescribed.insert(bc.dof(), bc.displacement);
    }
    Ok(prescribed)
}

/// Solve `K du = F` with prescribed DOFs held by a penalty `kappa` on their
/// diagonal. Eliminating the fixed block from that system leaves the free
/// DOFs on the Schur complement `K11 - K12 (K22 + kappa I)^-1 K21`; the fixed
/// DOFs are then set to their exact increment.
fn solve_partitioned(
    mut k: CooMatrix<f64>,
    mut f: DVector<f64>,
    prescribed: &BTreeMap<usize, f64>,
    u: &Array2<f64>,
) -> Result<DVector<f64>> {
    let n = f.len();
    if prescribed.len() == n {
        let mut du = DVector::zeros(n);
        for (&dof, &target) in prescribed {
            du[dof] = target - u[[dof / 3, dof % 3]];
        }
        return Ok(du);
    }

    if !prescribed.is_empty() {
        let diagonal: f64 = k
            .triplet_iter()
            .filter(|(r, c, _)| r == c)
            .map(|(_, _, v)| v.abs())
            .sum();
        let kappa = BC_PENALTY_FACTOR * (diagonal / n as f64).max(1.0);
        for (&dof, &target) in prescribed {
            k.push(dof, dof, kappa);
            f[dof] += kappa * (target - u[[dof / 3, dof % 3]]);
        }
    }

    let mut du = cholesky_solve(&k, &f)?;
    for (&dof, &target) in prescribed {
        du[dof] = target - u[[dof / 3, dof % 3]];
    }
    Ok(du)
}

fn cholesky_solve(k: &CooMatrix<f64>, f: &DVector<f64>) -> Result<DVector<f64>> {
    let csc = CscMatrix::from(k);
    let factor = CscCholesky::factor(&csc).map_err(|_| {
        CorrelError::SingularSystem("global stiffness matrix is not positive definite".into())
    })?;
    let rhs = DMatrix::from_column_slice(f.len(), 1, f.as_slice());
    Ok(factor.solve(&rhs).column(0).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Diagonally dominant cell systems on a one-box grid, so the assembled
    /// `K` is symmetric positive definite.
    fn box_systems() -> (Mesh, Vec<CellSystem>) {
        let mesh = Mesh::regular_grid([0.0; 3], [1.0; 3], [1, 1, 1]).unwrap();
        let systems = (0..mesh.cell_count())
            .map(|cell| CellSystem {
                k: SMatrix::from_fn(|i, j| {
                    if i == j {
                        2.0 + cell as f64
                    } else {
                        0.1 / (1.0 + i.abs_diff(j) as f64)
                    }
                }),
                f: SVector::from_fn(|i, _| (i as f64 + 0.7 * cell as f64).sin()),
            })
            .collect();
        (mesh, systems)
    }

    fn dense(mesh: &Mesh, systems: &[CellSystem]) -> DMatrix<f64> {
        let n = 3 * mesh.node_count();
        let mut k = DMatrix::zeros(n, n);
        for (cell, system) in mesh.cells.iter().zip(systems) {
            let dofs: [usize; 12] = std::array::from_fn(|l| 3 * cell[l / 3] + l % 3);
            for (lr, &gr) in dofs.iter().enumerate() {
                for (lc, &gc) in dofs.iter().enumerate() {
                    k[(gr, gc)] += system.k[(lr, lc)];
                }
            }
        }
        k
    }

    #[test]
    fn test_sparse_solve_matches_dense() {
        let (mesh, systems) = box_systems();
        let (k, f) = scatter(&mesh, &systems);
        let u = Array2::zeros((mesh.node_count(), 3));

        let du = solve_partitioned(k, f.clone(), &BTreeMap::new(), &u).unwrap();
        let expected = dense(&mesh, &systems).lu().solve(&f).unwrap();
        for (a, b) in du.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-10, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_prescribed_dofs_are_eliminated() {
        let (mesh, systems) = box_systems();
        let (k, f) = scatter(&mesh, &systems);
        let mut u = Array2::zeros((mesh.node_count(), 3));
        u[[0, 1]] = 0.5;
        let prescribed: BTreeMap<usize, f64> = [(0, 0.3), (1, -0.2), (7 * 3 + 2, 1.1)].into();

        let du = solve_partitioned(k, f.clone(), &prescribed, &u).unwrap();
        assert_eq!(du[0], 0.3);
        assert_eq!(du[1], -0.2 - 0.5);
        assert_eq!(du[23], 1.1);

        // Free block of K du = F with the fixed increments moved to the right.
        let full = dense(&mesh, &systems);
        let free: Vec<usize> = (0..24).filter(|i| !prescribed.contains_key(i)).collect();
        let k11 = DMatrix::from_fn(free.len(), free.len(), |r, c| full[(free[r], free[c])]);
        let g = DVector::from_fn(free.len(), |r, _| {
            f[free[r]] - prescribed.keys().map(|&d| full[(free[r], d)] * du[d]).sum::<f64>()
        });
        let expected = k11.lu().solve(&g).unwrap();
        for (r, &dof) in free.iter().enumerate() {
            assert!(
                (du[dof] - expected[r]).abs() < 1e-6,
                "dof {}: {} vs {}",
                dof,
                du[dof],
                expected[r]
            );
        }
    }

    #[test]
    fn test_empty_system_is_singular() {
        let (mesh, _) = box_systems();
        let systems: Vec<CellSystem> = (0..mesh.cell_count())
            .map(|_| CellSystem {
                k: SMatrix::zeros(),
                f: SVector::zeros(),
            })
            .collect();
        let (k, f) = scatter(&mesh, &systems);
        let u = Array2::zeros((mesh.node_count(), 3));

        let err = solve_partitioned(k, f, &BTreeMap::new(), &u).unwrap_err();
        assert!(matches!(err, CorrelError::SingularSystem(_)), "{}", err);
    }
}
