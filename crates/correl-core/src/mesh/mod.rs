//! Tetrahedral meshes for global (finite-element) correlation.

mod global;

pub use global::{
    global_correlation, BoundaryCondition, GlobalCorrelation, GlobalCorrelationConfig,
    GlobalCorrelationResult,
};

use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;

use crate::consts::{BARYCENTRIC_TOLERANCE, EPSILON};
use crate::error::{CorrelError, Result};

/// Unstructured tetrahedral mesh in voxel coordinates `(z, y, x)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub points: Vec<[f64; 3]>,
    pub cells: Vec<[usize; 4]>,
}

impl Mesh {
    /// Validate node indices and reject flat tetrahedra.
    pub fn new(points: Vec<[f64; 3]>, cells: Vec<[usize; 4]>) -> Result<Self> {
        let mesh = Self { points, cells };
        for (k, cell) in mesh.cells.iter().enumerate() {
            if let Some(&bad) = cell.iter().find(|&&n| n >= mesh.points.len()) {
                return Err(CorrelError::InvalidParameter(format!(
                    "cell {} references node {} of {}",
                    k,
                    bad,
                    mesh.points.len()
                )));
            }
            if mesh.edge_matrix(k).determinant().abs() < EPSILON {
                return Err(CorrelError::InvalidParameter(format!(
                    "cell {} is degenerate",
                    k
                )));
            }
        }
        Ok(mesh)
    }

    /// Structured mesh of the box `origin + [0, counts * spacing]`, each
    /// hexahedral cell split into six tetrahedra around its main diagonal.
    pub fn regular_grid(
        origin: [f64; 3],
        spacing: [f64; 3],
        counts: [usize; 3],
    ) -> Result<Self> {
        if spacing.iter().any(|&h| !h.is_finite() || h <= 0.0) {
            return Err(CorrelError::InvalidParameter(format!(
                "grid spacing {:?} must be finite and positive",
                spacing
            )));
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(CorrelError::InvalidParameter(format!(
                "grid origin {:?} must be finite",
                origin
            )));
        }
        if counts.contains(&0) {
            return Err(CorrelError::InvalidParameter(format!(
                "grid needs at least one cell per axis, got {:?}",
                counts
            )));
        }

        let [cz, cy, cx] = counts;
        let node = |i: usize, j: usize, k: usize| (i * (cy + 1) + j) * (cx + 1) + k;

        let mut points = Vec::with_capacity((cz + 1) * (cy + 1) * (cx + 1));
        for i in 0..=cz {
            for j in 0..=cy {
                for k in 0..=cx {
                    points.push([
                        origin[0] + i as f64 * spacing[0],
                        origin[1] + j as f64 * spacing[1],
                        origin[2] + k as f64 * spacing[2],
                    ]);
                }
            }
        }

        // Axis orderings of the six monotone paths from corner 000 to 111.
        const PATHS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let mut cells = Vec::with_capacity(6 * cz * cy * cx);
        for i in 0..cz {
            for j in 0..cy {
                for k in 0..cx {
                    for path in PATHS {
                        let mut corner = [i, j, k];
                        let mut tet = [node(i, j, k), 0, 0, 0];
                        for (step, &axis) in path.iter().enumerate() {
                            corner[axis] += 1;
                            tet[step + 1] = node(corner[0], corner[1], corner[2]);
                        }
                        cells.push(tet);
                    }
                }
            }
        }

        Self::new(points, cells)
    }

    pub fn node_count(&self) -> usize {
        self.points.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn edge_matrix(&self, cell: usize) -> Matrix3<f64> {
        let c = self.cells[cell];
        let p0 = Vector3::from(self.points[c[0]]);
        Matrix3::from_columns(&[
            Vector3::from(self.points[c[1]]) - p0,
            Vector3::from(self.points[c[2]]) - p0,
            Vector3::from(self.points[c[3]]) - p0,
        ])
    }

    /// Inverse edge matrices, one per cell, for barycentric coordinates.
    /// `None` marks a flat cell, which only a hand-built `Mesh` can hold.
    pub(crate) fn barycentric_maps(&self) -> Vec<Option<Matrix3<f64>>> {
        (0..self.cells.len())
            .map(|k| {
                let edges = self.edge_matrix(k);
                if edges.determinant().abs() < EPSILON {
                    None
                } else {
                    edges.try_inverse()
                }
            })
            .collect()
    }

    /// Linear shape functions of `cell` at `point`.
    pub(crate) fn shape_functions(
        &self,
        cell: usize,
        inverse: &Matrix3<f64>,
        point: [f64; 3],
    ) -> [f64; 4] {
        let p0 = Vector3::from(self.points[self.cells[cell][0]]);
        let l = inverse * (Vector3::from(point) - p0);
        [1.0 - l[0] - l[1] - l[2], l[0], l[1], l[2]]
    }
}

/// Rasterize mesh cells into a label volume: voxel centres inside cell `k`
/// get label `k + 1`, voxels outside every cell get 0. A voxel on a shared
/// face keeps the lowest cell label. Flat cells cover no voxel.
pub fn label_tetrahedra(mesh: &Mesh, shape: [usize; 3]) -> Array3<u32> {
    let mut labels = Array3::<u32>::zeros((shape[0], shape[1], shape[2]));
    let maps = mesh.barycentric_maps();

    for (k, (cell, map)) in mesh.cells.iter().zip(&maps).enumerate() {
        let Some(map) = map else {
            continue;
        };
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut empty = false;
        for a in 0..3 {
            let coords = cell.iter().map(|&n| mesh.points[n][a]);
            let min = coords.clone().fold(f64::INFINITY, f64::min);
            let max = coords.fold(f64::NEG_INFINITY, f64::max);
            if max < 0.0 || min > shape[a] as f64 - 1.0 {
                empty = true;
                break;
            }
            lo[a] = min.max(0.0).ceil() as usize;
            hi[a] = (max.floor() as usize).min(shape[a] - 1);
        }
        if empty {
            continue;
        }

        for z in lo[0]..=hi[0] {
            for y in lo[1]..=hi[1] {
                for x in lo[2]..=hi[2] {
                    if labels[[z, y, x]] != 0 {
                        continue;
                    }
                    let n = mesh.shape_functions(k, map, [z as f64, y as f64, x as f64]);
                    if n.iter().all(|&v| v >= -BARYCENTRIC_TOLERANCE) {
                        labels[[z, y, x]] = k as u32 + 1;
                    }
                }
            }
        }
    }

    labels
}
