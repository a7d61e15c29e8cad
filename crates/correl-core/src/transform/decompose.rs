use nalgebra::{Matrix3, Rotation3, Vector3};

use super::Phi;

/// Polar decomposition of Phi's linear part, `F = R U`.
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposition {
    /// Translation at the requested point.
    pub translation: Vector3<f64>,
    /// Rotation vector (axis scaled by angle), in degrees.
    pub rotation: Vector3<f64>,
    /// Right stretch tensor U (symmetric).
    pub stretch: Matrix3<f64>,
    /// Diagonal of U.
    pub zoom: Vector3<f64>,
    /// Off-diagonal terms of U: `(U_zy, U_zx, U_yx)`.
    pub shear: Vector3<f64>,
    /// `det(U)`, the local volume ratio.
    pub volumetric_change: f64,
}

impl Decomposition {
    /// Rotation angle in degrees.
    pub fn rotation_angle(&self) -> f64 {
        self.rotation.norm()
    }
}

/// Decompose `phi` (acting about `centre`) into rotation, stretch and the
/// translation experienced at `point`.
pub fn decompose(phi: &Phi, centre: [f64; 3], point: [f64; 3]) -> Decomposition {
    let f = phi.linear();
    let svd = f.svd(true, true);
    let mut w = svd.u.unwrap_or_else(Matrix3::identity);
    let v_t = svd.v_t.unwrap_or_else(Matrix3::identity);
    let mut sigma = svd.singular_values;

    // Keep R a proper rotation; a reflection ends up as a negative stretch.
    if (w * v_t).determinant() < 0.0 {
        w.column_mut(2).neg_mut();
        sigma[2] = -sigma[2];
    }

    let r = w * v_t;
    let u = v_t.transpose() * Matrix3::from_diagonal(&sigma) * v_t;
    let rotation = Rotation3::from_matrix_unchecked(r).scaled_axis().map(f64::to_degrees);

    Decomposition {
        translation: phi.translation_at(centre, point),
        rotation,
        stretch: u,
        zoom: Vector3::new(u[(0, 0)], u[(1, 1)], u[(2, 2)]),
        shear: Vector3::new(u[(0, 1)], u[(0, 2)], u[(1, 2)]),
        volumetric_change: u.determinant(),
    }
}

/// Build Phi from a rotation vector (degrees), a stretch tensor and a
/// translation.
pub fn compose(rotation: &Vector3<f64>, stretch: &Matrix3<f64>, translation: &Vector3<f64>) -> Phi {
    let r = Rotation3::new(rotation.map(f64::to_radians));
    Phi::from_parts(&(r.matrix() * stretch), translation)
}
