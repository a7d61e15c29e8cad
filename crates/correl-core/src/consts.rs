/// Minimum voxel count to use Rayon parallelism in resampling and assembly.
pub const PARALLEL_VOXEL_THRESHOLD: usize = 65_536;

/// Minimum number of candidate offsets to run the pixel search in parallel.
pub const PARALLEL_OFFSET_THRESHOLD: usize = 64;

/// Default Newton-Raphson iteration budget.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Default convergence threshold on the norm of the Phi correction.
pub const DEFAULT_DELTA_PHI_MIN: f64 = 0.001;

/// A translation larger than this many margins in any axis is a divergence.
pub const DIVERGENCE_MARGIN_FACTOR: f64 = 5.0;

/// Lower bound on det(U) before the iteration is declared divergent.
pub const MIN_VOLUMETRIC_CHANGE: f64 = 0.2;

/// Upper bound on det(U) before the iteration is declared divergent.
pub const MAX_VOLUMETRIC_CHANGE: f64 = 3.0;

/// In the second half of the budget, an error above this fraction of the
/// previous one is a divergence.
pub const ERROR_GROWTH_RATIO: f64 = 0.8;

/// Reciprocal condition number below which the normal equations are singular.
pub const SINGULAR_RCOND: f64 = 1e-12;

/// Default convergence threshold on the nodal displacement increment norm.
pub const DEFAULT_GLOBAL_CONVERGENCE: f64 = 0.01;

/// Default iteration budget for mesh global correlation.
pub const DEFAULT_GLOBAL_MAX_ITERATIONS: usize = 20;

/// Penalty weight (relative to the mean diagonal of K) on prescribed DOFs.
pub const BC_PENALTY_FACTOR: f64 = 1e8;

/// Tolerance on barycentric coordinates when deciding tetrahedron membership.
pub const BARYCENTRIC_TOLERANCE: f64 = 1e-9;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// Indices of the six Phi parameters that exist for a 2D image
/// (yy, yx, ty, xy, xx, tx in the row-major 3x4 layout).
pub const PLANAR_PARAMETERS: [usize; 6] = [5, 6, 7, 9, 10, 11];
