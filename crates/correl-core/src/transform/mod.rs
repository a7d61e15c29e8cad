//! Homogeneous 4x4 transformation operator Phi.
//!
//! The top-left 3x3 block is the linear part F (rotation and stretch), the
//! first three rows of the last column hold the translation, and the last row
//! is `[0, 0, 0, 1]`. Phi always acts about a reference point `c`:
//! `x' = c + F (x - c) + t`. Components are ordered `(z, y, x)`.

mod decompose;

pub use decompose::{compose, decompose, Decomposition};

use std::ops::Mul;

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Transformation operator mapping reference coordinates to moving coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Phi(pub Matrix4<f64>);

impl Default for Phi {
    fn default() -> Self {
        Self::identity()
    }
}

impl Phi {
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Pure translation `(tz, ty, tx)`.
    pub fn from_translation(t: [f64; 3]) -> Self {
        let mut phi = Self::identity();
        phi.set_translation(Vector3::from(t));
        phi
    }

    /// Assemble from a linear part and a translation.
    pub fn from_parts(linear: &Matrix3<f64>, translation: &Vector3<f64>) -> Self {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Self(m)
    }

    pub fn linear(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(0, 3).into_owned()
    }

    pub fn set_translation(&mut self, t: Vector3<f64>) {
        self.0.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
    }

    /// Multiply the translation by `ratio`, used when moving between binning
    /// levels.
    pub fn scale_translation(&mut self, ratio: f64) {
        let t = self.translation() * ratio;
        self.set_translation(t);
    }

    pub fn inverse(&self) -> Option<Phi> {
        if self.linear().determinant().abs() < crate::consts::EPSILON {
            return None;
        }
        self.0.try_inverse().map(Phi)
    }

    pub fn is_invertible(&self) -> bool {
        self.inverse().is_some()
    }

    /// Add a 12-parameter correction laid out as the row-major 3x4 top block.
    pub fn add_correction(&self, delta: &[f64; 12]) -> Phi {
        let mut m = self.0;
        for row in 0..3 {
            for col in 0..4 {
                m[(row, col)] += delta[4 * row + col];
            }
        }
        Phi(m)
    }

    /// Map a point, with Phi acting about `centre`.
    pub fn apply(&self, point: [f64; 3], centre: [f64; 3]) -> [f64; 3] {
        let c = Vector3::from(centre);
        let mapped = c + self.linear() * (Vector3::from(point) - c) + self.translation();
        [mapped[0], mapped[1], mapped[2]]
    }

    /// Translation at `point` when Phi acts about `centre`:
    /// `t + (F - I)(point - centre)`.
    pub fn translation_at(&self, centre: [f64; 3], point: [f64; 3]) -> Vector3<f64> {
        let offset = Vector3::from(point) - Vector3::from(centre);
        self.translation() + (self.linear() - Matrix3::identity()) * offset
    }

    /// The same mapping re-expressed about a different reference point.
    pub fn recentred(&self, from: [f64; 3], to: [f64; 3]) -> Phi {
        Phi::from_parts(&self.linear(), &self.translation_at(from, to))
    }

    /// Closest rigid operator: stretch dropped, rotation and translation kept.
    pub fn rigid(&self) -> Phi {
        let d = decompose(self, [0.0; 3], [0.0; 3]);
        compose(&d.rotation, &Matrix3::identity(), &d.translation)
    }

    /// Top 3x4 block as the 12-parameter row-major vector.
    pub fn parameters(&self) -> [f64; 12] {
        let mut p = [0.0; 12];
        for row in 0..3 {
            for col in 0..4 {
                p[4 * row + col] = self.0[(row, col)];
            }
        }
        p
    }
}

impl Mul for Phi {
    type Output = Phi;

    fn mul(self, rhs: Phi) -> Phi {
        Phi(self.0 * rhs.0)
    }
}
