use ndarray::Array3;

use correl_core::transform::Phi;
use correl_core::volume::{centre, Volume};

/// Smooth 2D texture: Gaussian blobs on a jittered lattice, defined in the
/// `(y, x)` plane everywhere so any warp of it can be evaluated exactly.
#[derive(Clone, Copy, Debug)]
pub struct Blobs {
    pub sigma: f64,
    pub spacing: f64,
    pub extent: f64,
}

impl Blobs {
    pub fn new(sigma: f64, spacing: f64, extent: f64) -> Self {
        Self {
            sigma,
            spacing,
            extent,
        }
    }

    pub fn value(&self, p: [f64; 3]) -> f64 {
        let mut state = 0x2545_f491_u64;
        let mut next = || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 33) as f64 / (1u64 << 31) as f64
        };

        let steps = (self.extent / self.spacing).ceil() as i64 + 2;
        let two_sigma2 = 2.0 * self.sigma * self.sigma;
        let mut v = 0.1;
        for i in -2..steps {
            for j in -2..steps {
                let cy = i as f64 * self.spacing + (next() - 0.5) * self.spacing * 0.6;
                let cx = j as f64 * self.spacing + (next() - 0.5) * self.spacing * 0.6;
                let amplitude = 0.4 + 0.6 * next();
                let dy = p[1] - cy;
                let dx = p[2] - cx;
                let r2 = dy * dy + dx * dx;
                if r2 < 25.0 * two_sigma2 {
                    v += amplitude * (-r2 / two_sigma2).exp();
                }
            }
        }
        v
    }
}

/// Smooth 3D texture varying along every axis.
pub fn trig(p: [f64; 3]) -> f64 {
    let [z, y, x] = p;
    0.5 + 0.2 * (0.35 * z + 0.2 * y).sin() * (0.3 * y - 0.25 * x).cos()
        + 0.15 * (0.4 * x + 0.15 * z).sin()
        + 0.1 * (0.27 * z - 0.33 * x + 0.1 * y).cos()
}

/// Evaluate `f` at every voxel of `shape`.
pub fn render(shape: [usize; 3], f: impl Fn([f64; 3]) -> f64) -> Volume {
    Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(z, y, x)| {
        f([z as f64, y as f64, x as f64]) as f32
    })
}

/// Image of the texture `f` deformed by `phi` about the image centre, so that
/// registering `render(shape, f)` onto it recovers `phi`.
pub fn render_deformed(shape: [usize; 3], phi: &Phi, f: impl Fn([f64; 3]) -> f64) -> Volume {
    let c = centre(shape);
    let inverse = phi.inverse().expect("test operator is invertible");
    render(shape, |p| f(inverse.apply(p, c)))
}

pub fn blobs_2d(size: usize) -> Blobs {
    Blobs::new(4.5, 10.0, size as f64)
}
