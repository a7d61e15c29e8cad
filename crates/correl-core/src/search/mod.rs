//! Exhaustive integer displacement search.
//!
//! The reference sub-image is placed with its centre on `search_centre` of
//! the (larger) search image, then every integer offset of the search range
//! is scored by normalized cross-correlation. Used to bootstrap Phi's
//! translation before Newton-Raphson refinement.

use ndarray::{s, ArrayView3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::PARALLEL_OFFSET_THRESHOLD;
use crate::error::{CorrelError, Result};
use crate::transform::Phi;
use crate::volume::{centre, shape_of};

/// Inclusive integer offset range per axis, `[low, high]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRange {
    pub z: [i64; 2],
    pub y: [i64; 2],
    pub x: [i64; 2],
}

impl SearchRange {
    /// `[-r, r]` on every axis; the z range collapses to zero for 2D images.
    pub fn symmetric(radius: [i64; 3]) -> Self {
        Self {
            z: [-radius[0], radius[0]],
            y: [-radius[1], radius[1]],
            x: [-radius[2], radius[2]],
        }
    }

    fn axes(&self) -> [[i64; 2]; 3] {
        [self.z, self.y, self.x]
    }

    fn candidate_count(&self) -> usize {
        self.axes()
            .iter()
            .map(|[lo, hi]| (hi - lo + 1).max(0) as usize)
            .product()
    }
}

impl Default for SearchRange {
    fn default() -> Self {
        Self::symmetric([0, 5, 5])
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelSearchConfig {
    #[serde(default)]
    pub search_range: SearchRange,
    /// Point of the search image the reference centre is placed on.
    /// `None` uses the search image centre.
    #[serde(default)]
    pub search_centre: Option<[f64; 3]>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelSearchResult {
    /// Best integer displacement `(z, y, x)`, counted from the voxel-aligned
    /// placement nearest to `search_centre` (see `base_offset`).
    pub translation: [i64; 3],
    /// Normalized cross-correlation at the best displacement.
    pub score: f64,
    /// Where a zero `translation` puts the reference centre, relative to
    /// `search_centre`. Non-zero (up to half a voxel) only when the window
    /// cannot be centred exactly, e.g. reference and search sizes of
    /// different parity.
    pub base_offset: [f64; 3],
}

impl PixelSearchResult {
    /// Pure-translation Phi to seed a registration.
    pub fn to_phi(&self) -> Phi {
        Phi::from_translation(self.translation.map(|t| t as f64))
    }

    /// Offset of the matched reference centre from `search_centre`.
    pub fn displacement(&self) -> [f64; 3] {
        std::array::from_fn(|a| self.translation[a] as f64 + self.base_offset[a])
    }
}

/// Search every integer offset of `config.search_range` for the best match of
/// `reference` inside `search`. Voxels excluded by `mask` (same shape as
/// `reference`) and non-finite voxels do not contribute to the score.
pub fn pixel_search(
    reference: ArrayView3<'_, f32>,
    search: ArrayView3<'_, f32>,
    mask: Option<ArrayView3<'_, bool>>,
    config: &PixelSearchConfig,
) -> Result<PixelSearchResult> {
    let ref_shape = shape_of(&reference);
    let search_shape = shape_of(&search);

    if (0..3).any(|a| search_shape[a] < ref_shape[a]) {
        return Err(CorrelError::ShapeMismatch(format!(
            "search image {:?} is smaller than reference {:?}",
            search_shape, ref_shape
        )));
    }
    if let Some(m) = &mask {
        if shape_of(m) != ref_shape {
            return Err(CorrelError::ShapeMismatch(format!(
                "mask shape {:?} differs from reference shape {:?}",
                shape_of(m),
                ref_shape
            )));
        }
    }
    let axes = config.search_range.axes();
    if axes.iter().any(|[lo, hi]| lo > hi) {
        return Err(CorrelError::InvalidParameter(format!(
            "empty search range {:?}",
            config.search_range
        )));
    }

    let search_centre = config.search_centre.unwrap_or_else(|| centre(search_shape));
    let ref_centre = centre(ref_shape);
    let start: [i64; 3] =
        std::array::from_fn(|a| (search_centre[a] - ref_centre[a]).round() as i64);
    let base_offset: [f64; 3] =
        std::array::from_fn(|a| start[a] as f64 - (search_centre[a] - ref_centre[a]));

    let candidates: Vec<[i64; 3]> = (axes[0][0]..=axes[0][1])
        .flat_map(|dz| {
            (axes[1][0]..=axes[1][1])
                .flat_map(move |dy| (axes[2][0]..=axes[2][1]).map(move |dx| [dz, dy, dx]))
        })
        .filter(|d| {
            (0..3).all(|a| {
                let lo = start[a] + d[a];
                lo >= 0 && lo as usize + ref_shape[a] <= search_shape[a]
            })
        })
        .collect();

    if candidates.is_empty() {
        return Err(CorrelError::InvalidParameter(
            "search range leaves no candidate inside the search image".into(),
        ));
    }

    let score_at = |(index, d): (usize, &[i64; 3])| {
        let lo: [usize; 3] = std::array::from_fn(|a| (start[a] + d[a]) as usize);
        let window = search.slice(s![
            lo[0]..lo[0] + ref_shape[0],
            lo[1]..lo[1] + ref_shape[1],
            lo[2]..lo[2] + ref_shape[2]
        ]);
        (index, *d, correlation(&reference, &window, mask.as_ref()))
    };

    // Ties go to the earliest candidate so both paths agree.
    let better = |a: (usize, [i64; 3], f64), b: (usize, [i64; 3], f64)| {
        if b.2 > a.2 || (b.2 == a.2 && b.0 < a.0) {
            b
        } else {
            a
        }
    };
    let worst = (usize::MAX, [0; 3], f64::NEG_INFINITY);

    let best = if config.search_range.candidate_count() >= PARALLEL_OFFSET_THRESHOLD {
        candidates
            .par_iter()
            .enumerate()
            .map(score_at)
            .reduce(|| worst, better)
    } else {
        candidates.iter().enumerate().map(score_at).fold(worst, better)
    };

    debug!(translation = ?best.1, score = best.2, ?base_offset, "pixel search finished");

    Ok(PixelSearchResult {
        translation: best.1,
        score: best.2,
        base_offset,
    })
}

/// `sum(a b) / sqrt(sum(a^2) sum(b^2))`; zero when either image is empty.
fn correlation(
    a: &ArrayView3<'_, f32>,
    b: &ArrayView3<'_, f32>,
    mask: Option<&ArrayView3<'_, bool>>,
) -> f64 {
    let mut ab = 0.0f64;
    let mut aa = 0.0f64;
    let mut bb = 0.0f64;

    for ((index, &va), &vb) in a.indexed_iter().zip(b.iter()) {
        if mask.is_some_and(|m| m[index]) || !va.is_finite() || !vb.is_finite() {
            continue;
        }
        let (va, vb) = (va as f64, vb as f64);
        ab += va * vb;
        aa += va * va;
        bb += vb * vb;
    }

    let denom = (aa * bb).sqrt();
    if denom > 0.0 {
        ab / denom
    } else {
        0.0
    }
}
