//! Dense image volumes and the geometry helpers shared by every correlator.
//!
//! A 2D image is stored as a volume with a unit leading (z) axis, so all
//! algorithms work on `Array3` and branch on [`is_planar`] where the third
//! dimension matters.

use ndarray::{s, Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{CorrelError, Result};

/// Grayscale image or volume, indexed `[z, y, x]`.
pub type Volume = Array3<f32>;

/// Exclusion mask with the same shape as a volume; `true` marks excluded voxels.
pub type Mask = Array3<bool>;

/// True when the shape describes a 2D image (unit z axis).
pub fn is_planar(shape: [usize; 3]) -> bool {
    shape[0] == 1
}

/// Shape of an array view as a fixed-size array.
pub fn shape_of<T>(view: &ArrayView3<'_, T>) -> [usize; 3] {
    let (nz, ny, nx) = view.dim();
    [nz, ny, nx]
}

/// Geometric centre of a shape, `(n - 1) / 2` per axis.
pub fn centre(shape: [usize; 3]) -> [f64; 3] {
    [
        (shape[0] as f64 - 1.0) / 2.0,
        (shape[1] as f64 - 1.0) / 2.0,
        (shape[2] as f64 - 1.0) / 2.0,
    ]
}

/// Per-axis padding, in voxels, removed from the reference correlation region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Margin(pub [usize; 3]);

impl Margin {
    pub fn uniform(m: usize) -> Self {
        Self([m; 3])
    }

    /// Margin large enough for a 45 degree rotation about the centre with no
    /// displacement: `ceil((sqrt(3) - 1) * max_dim / 2)` on every axis.
    pub fn auto(shape: [usize; 3]) -> Self {
        let max_dim = shape.iter().copied().max().unwrap_or(0) as f64;
        let m = ((3.0f64.sqrt() - 1.0) * max_dim / 2.0).ceil() as usize;
        Self::uniform(m).for_shape(shape)
    }

    /// Drop the z margin for planar images.
    pub fn for_shape(self, shape: [usize; 3]) -> Self {
        let mut m = self.0;
        if is_planar(shape) {
            m[0] = 0;
        }
        Self(m)
    }

    /// Margin at a binning level. Non-zero axes never drop below one voxel.
    pub fn scaled_down(self, factor: usize) -> Self {
        if factor <= 1 {
            return self;
        }
        Self(self.0.map(|m| if m == 0 { 0 } else { (m / factor).max(1) }))
    }
}

/// Axis-aligned sub-region of a volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crop {
    pub start: [usize; 3],
    pub shape: [usize; 3],
}

impl Crop {
    /// Region left after removing `margin` from both sides of every axis.
    pub fn from_margin(shape: [usize; 3], margin: Margin) -> Result<Self> {
        let mut start = [0; 3];
        let mut size = [0; 3];
        for axis in 0..3 {
            let m = margin.0[axis];
            if shape[axis] <= 2 * m {
                return Err(CorrelError::ShapeMismatch(format!(
                    "margin {} leaves nothing of axis {} (length {})",
                    m, axis, shape[axis]
                )));
            }
            start[axis] = m;
            size[axis] = shape[axis] - 2 * m;
        }
        Ok(Self { start, shape: size })
    }

    pub fn view<'a, T>(&self, data: ArrayView3<'a, T>) -> ArrayView3<'a, T> {
        let [z, y, x] = self.start;
        let [nz, ny, nx] = self.shape;
        data.slice_move(s![z..z + nz, y..y + ny, x..x + nx])
    }

    pub fn voxel_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Per-axis image gradients, `[d/dz, d/dy, d/dx]`.
#[derive(Clone, Debug)]
pub struct Gradients {
    pub z: Array3<f32>,
    pub y: Array3<f32>,
    pub x: Array3<f32>,
}

impl Gradients {
    /// Second-order central differences inside, first-order at the borders.
    /// The gradient along a unit axis is zero.
    pub fn of(data: &ArrayView3<'_, f32>) -> Self {
        Self {
            z: axis_gradient(data, Axis(0)),
            y: axis_gradient(data, Axis(1)),
            x: axis_gradient(data, Axis(2)),
        }
    }

    pub fn at(&self, index: [usize; 3]) -> [f32; 3] {
        [self.z[index], self.y[index], self.x[index]]
    }
}

fn axis_gradient(data: &ArrayView3<'_, f32>, axis: Axis) -> Array3<f32> {
    let mut out = Array3::<f32>::zeros(data.raw_dim());
    let n = data.len_of(axis);
    if n < 2 {
        return out;
    }

    Zip::from(out.lanes_mut(axis))
        .and(data.lanes(axis))
        .for_each(|mut g, f| {
            g[0] = f[1] - f[0];
            g[n - 1] = f[n - 1] - f[n - 2];
            for i in 1..n - 1 {
                g[i] = 0.5 * (f[i + 1] - f[i - 1]);
            }
        });

    out
}

/// Downsample by averaging `factor`-sized blocks. The z axis of a planar
/// image is left untouched; trailing partial blocks are dropped.
pub fn bin(data: &ArrayView3<'_, f32>, factor: usize) -> Result<Volume> {
    let shape = shape_of(data);
    let factors = bin_factors(shape, factor)?;

    let out_shape = [
        shape[0] / factors[0],
        shape[1] / factors[1],
        shape[2] / factors[2],
    ];
    let norm = 1.0 / factors.iter().product::<usize>() as f64;

    let out = Array3::from_shape_fn((out_shape[0], out_shape[1], out_shape[2]), |(z, y, x)| {
        let block = data.slice(s![
            z * factors[0]..(z + 1) * factors[0],
            y * factors[1]..(y + 1) * factors[1],
            x * factors[2]..(x + 1) * factors[2]
        ]);
        (block.iter().map(|&v| v as f64).sum::<f64>() * norm) as f32
    });

    Ok(out)
}

/// Downsample a mask: a binned voxel is excluded if any of its block is.
pub fn bin_mask(mask: &ArrayView3<'_, bool>, factor: usize) -> Result<Mask> {
    let shape = shape_of(mask);
    let factors = bin_factors(shape, factor)?;

    let out = Array3::from_shape_fn(
        (
            shape[0] / factors[0],
            shape[1] / factors[1],
            shape[2] / factors[2],
        ),
        |(z, y, x)| {
            mask.slice(s![
                z * factors[0]..(z + 1) * factors[0],
                y * factors[1]..(y + 1) * factors[1],
                x * factors[2]..(x + 1) * factors[2]
            ])
            .iter()
            .any(|&m| m)
        },
    );

    Ok(out)
}

fn bin_factors(shape: [usize; 3], factor: usize) -> Result<[usize; 3]> {
    if factor == 0 {
        return Err(CorrelError::InvalidParameter(
            "binning factor must be at least 1".into(),
        ));
    }
    let factors = if is_planar(shape) {
        [1, factor, factor]
    } else {
        [factor; 3]
    };
    if (0..3).any(|a| shape[a] < factors[a]) {
        return Err(CorrelError::ShapeMismatch(format!(
            "cannot bin shape {:?} by {}",
            shape, factor
        )));
    }
    Ok(factors)
}

/// Centroid of the included (`false`) voxels of a mask, offset by `origin`.
///
/// Returns `None` when every voxel is excluded.
pub fn included_centroid(mask: &ArrayView3<'_, bool>, origin: [usize; 3]) -> Option<[f64; 3]> {
    let mut sum = [0.0f64; 3];
    let mut count = 0usize;

    for ((z, y, x), &excluded) in mask.indexed_iter() {
        if !excluded {
            sum[0] += z as f64;
            sum[1] += y as f64;
            sum[2] += x as f64;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some([
        origin[0] as f64 + sum[0] / n,
        origin[1] as f64 + sum[1] / n,
        origin[2] as f64 + sum[2] / n,
    ])
}
