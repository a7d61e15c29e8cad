use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

/// Interpolation kernel used when sampling between voxels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Order 0.
    Nearest,
    /// Order 1 (trilinear).
    #[default]
    Linear,
    /// Order 3 (Catmull-Rom cubic convolution).
    Cubic,
}

impl Interpolation {
    /// Map a numeric interpolation order: 0 nearest, 1-2 linear, 3+ cubic.
    pub fn from_order(order: u8) -> Self {
        match order {
            0 => Self::Nearest,
            1 | 2 => Self::Linear,
            _ => Self::Cubic,
        }
    }

    pub fn order(&self) -> u8 {
        match self {
            Self::Nearest => 0,
            Self::Linear => 1,
            Self::Cubic => 3,
        }
    }
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Linear => write!(f, "linear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

/// Positions this close outside `[0, n - 1]` still count as inside.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Interpolation taps along one axis.
#[derive(Clone, Copy)]
struct Taps {
    index: [usize; 4],
    weight: [f64; 4],
    len: usize,
}

impl Taps {
    fn single(i: usize) -> Self {
        Self {
            index: [i, 0, 0, 0],
            weight: [1.0, 0.0, 0.0, 0.0],
            len: 1,
        }
    }
}

fn axis_taps(pos: f64, n: usize, interpolation: Interpolation) -> Option<Taps> {
    let last = n as f64 - 1.0;
    if !pos.is_finite() || pos < -EDGE_TOLERANCE || pos > last + EDGE_TOLERANCE {
        return None;
    }
    if n == 1 {
        return Some(Taps::single(0));
    }
    let pos = pos.clamp(0.0, last);

    match interpolation {
        Interpolation::Nearest => Some(Taps::single(pos.round() as usize)),
        Interpolation::Linear => {
            let i0 = (pos.floor() as usize).min(n - 2);
            let f = pos - i0 as f64;
            Some(Taps {
                index: [i0, i0 + 1, 0, 0],
                weight: [1.0 - f, f, 0.0, 0.0],
                len: 2,
            })
        }
        Interpolation::Cubic => {
            let i1 = (pos.floor() as usize).min(n - 2);
            let t = pos - i1 as f64;
            let t2 = t * t;
            let t3 = t2 * t;
            let clamp = |i: isize| i.clamp(0, n as isize - 1) as usize;
            let i1s = i1 as isize;
            Some(Taps {
                index: [clamp(i1s - 1), i1, i1 + 1, clamp(i1s + 2)],
                weight: [
                    0.5 * (-t3 + 2.0 * t2 - t),
                    0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
                    0.5 * (-3.0 * t3 + 4.0 * t2 + t),
                    0.5 * (t3 - t2),
                ],
                len: 4,
            })
        }
    }
}

/// Interpolate `data` at fractional `[z, y, x]`; NaN when out of bounds.
pub fn sample_at(data: &ArrayView3<'_, f32>, pos: [f64; 3], interpolation: Interpolation) -> f32 {
    let (nz, ny, nx) = data.dim();
    let (Some(tz), Some(ty), Some(tx)) = (
        axis_taps(pos[0], nz, interpolation),
        axis_taps(pos[1], ny, interpolation),
        axis_taps(pos[2], nx, interpolation),
    ) else {
        return f32::NAN;
    };

    let mut acc = 0.0f64;
    for a in 0..tz.len {
        for b in 0..ty.len {
            let wzy = tz.weight[a] * ty.weight[b];
            for c in 0..tx.len {
                let v = data[[tz.index[a], ty.index[b], tx.index[c]]] as f64;
                acc += wzy * tx.weight[c] * v;
            }
        }
    }
    acc as f32
}
