use ndarray::{ArrayView3, Zip};
use tracing::{debug, info, warn};

use crate::cancel::{self, CancelToken};
use crate::consts::{
    DIVERGENCE_MARGIN_FACTOR, EPSILON, ERROR_GROWTH_RATIO, MAX_VOLUMETRIC_CHANGE,
    MIN_VOLUMETRIC_CHANGE,
};
use crate::error::{CorrelError, Result};
use crate::resample::{create_resampler, Resampler, SamplingGrid};
use crate::transform::{decompose, Phi};
use crate::volume::{
    centre, included_centroid, is_planar, shape_of, Crop, Gradients, Margin, Mask, Volume,
};

use super::config::RegistrationConfig;
use super::operator::{create_assembler, OperatorAssembler};
use super::result::{Divergence, RegistrationResult, Status};

/// Newton-Raphson iteration controller.
///
/// Owns the collaborators chosen at construction: the [`Resampler`] that
/// warps the moving image and the [`OperatorAssembler`] that builds the
/// normal equations.
pub struct Registration {
    config: RegistrationConfig,
    resampler: Box<dyn Resampler>,
    assembler: Box<dyn OperatorAssembler>,
    cancel: Option<CancelToken>,
}

impl Registration {
    pub fn new(config: RegistrationConfig) -> Self {
        let resampler = create_resampler(config.interpolation);
        Self {
            config,
            resampler,
            assembler: create_assembler(),
            cancel: None,
        }
    }

    pub fn with_resampler(mut self, resampler: Box<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    pub fn with_assembler(mut self, assembler: Box<dyn OperatorAssembler>) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Register `moving` onto `reference`.
    ///
    /// Returns an error only for invalid inputs or cancellation; numerical
    /// trouble is reported through [`RegistrationResult::status`].
    pub fn run(
        &self,
        reference: ArrayView3<'_, f32>,
        moving: ArrayView3<'_, f32>,
        mask: Option<ArrayView3<'_, bool>>,
        phi_init: Option<&Phi>,
    ) -> Result<RegistrationResult> {
        let config = &self.config;
        let shape1 = shape_of(&reference);
        let shape2 = shape_of(&moving);
        let planar = is_planar(shape1);

        if planar != is_planar(shape2) {
            return Err(CorrelError::ShapeMismatch(format!(
                "cannot register shape {:?} against {:?}",
                shape1, shape2
            )));
        }
        if let Some(m) = &mask {
            if shape_of(m) != shape1 {
                return Err(CorrelError::ShapeMismatch(format!(
                    "mask shape {:?} differs from image shape {:?}",
                    shape_of(m),
                    shape1
                )));
            }
        }

        let margin = config
            .margin
            .unwrap_or_else(|| Margin::auto(shape1))
            .for_shape(shape1);
        let crop = Crop::from_margin(shape1, margin)?;
        if (0..3).any(|a| shape2[a] < crop.shape[a]) {
            return Err(CorrelError::ShapeMismatch(format!(
                "moving image {:?} is smaller than the reference region {:?}",
                shape2, crop.shape
            )));
        }

        let centre1 = centre(shape1);
        let grid = SamplingGrid::region(&crop, centre1, centre(shape2));
        let local_centre = [
            centre1[0] - crop.start[0] as f64,
            centre1[1] - crop.start[1] as f64,
            centre1[2] - crop.start[2] as f64,
        ];

        // Reference crop and gradients are fixed for the whole run.
        let mut ref_crop = crop.view(reference).to_owned();
        let gradients = Gradients::of(&ref_crop.view());

        let mut report_point = centre1;
        if let Some(m) = mask {
            let mask_crop = crop.view(m);
            Zip::from(&mut ref_crop).and(&mask_crop).for_each(|v, &excluded| {
                if excluded {
                    *v = f32::NAN;
                }
            });
            report_point = included_centroid(&mask_crop, crop.start).ok_or_else(|| {
                CorrelError::InvalidParameter(
                    "mask excludes every voxel of the correlation region".into(),
                )
            })?;
        }

        let intensity: f64 = ref_crop
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| v as f64)
            .sum();
        let normalisation = if intensity.abs() < EPSILON { 1.0 } else { intensity };

        let mut phi = phi_init.copied().unwrap_or_default();
        phi.scale_translation(config.phi_init_bin_ratio);
        if config.rigid {
            phi = phi.rigid();
        }

        let mut warped = self.resampler.resample(&moving, &phi, &grid);
        let mut error = residual_error(&ref_crop.view(), &warped.view()) / normalisation;
        let mut delta_phi_norm = f64::INFINITY;
        let mut iterations = 0usize;

        let status = if !phi.is_invertible() {
            warn!("initial Phi is not invertible");
            Status::Singular
        } else if config.max_iterations == 0 {
            Status::MaxIterations
        } else {
            loop {
                cancel::check(self.cancel.as_ref())?;
                iterations += 1;

                let ne = self.assembler.assemble(
                    &ref_crop.view(),
                    &warped.view(),
                    &gradients,
                    local_centre,
                );
                let Some(delta) = ne.solve(planar) else {
                    warn!(iterations, "normal-equation matrix is singular");
                    break Status::Singular;
                };
                delta_phi_norm = delta.iter().map(|d| d * d).sum::<f64>().sqrt();

                let mut candidate = phi.add_correction(&delta);
                if config.rigid {
                    candidate = candidate.rigid();
                }
                if !candidate.is_invertible() {
                    warn!(iterations, "updated Phi is not invertible");
                    break Status::Singular;
                }
                if let Some(kind) = check_geometry(&candidate, centre1, margin, planar) {
                    warn!(iterations, ?kind, "registration diverging");
                    break Status::Diverging(kind);
                }

                let candidate_warped = self.resampler.resample(&moving, &candidate, &grid);
                let candidate_error =
                    residual_error(&ref_crop.view(), &candidate_warped.view()) / normalisation;
                debug!(
                    iterations,
                    error = candidate_error,
                    delta_phi_norm,
                    "newton-raphson step"
                );

                if iterations > config.max_iterations / 2
                    && candidate_error > ERROR_GROWTH_RATIO * error
                {
                    warn!(iterations, error, candidate_error, "registration diverging");
                    break Status::Diverging(Divergence::ErrorGrowth);
                }

                phi = candidate;
                warped = candidate_warped;
                error = candidate_error;

                if delta_phi_norm <= config.delta_phi_min {
                    break Status::Converged;
                }
                if iterations >= config.max_iterations {
                    break Status::MaxIterations;
                }
            }
        };

        info!(%status, iterations, error, delta_phi_norm, "registration finished");

        let phi = if mask.is_some() {
            phi.recentred(centre1, report_point)
        } else {
            phi
        };

        Ok(RegistrationResult {
            phi,
            phi_centre: report_point,
            error,
            status,
            iterations,
            delta_phi_norm,
        })
    }
}

/// Register `moving` onto `reference` with the default collaborators.
pub fn register(
    reference: &Volume,
    moving: &Volume,
    mask: Option<&Mask>,
    phi_init: Option<&Phi>,
    config: &RegistrationConfig,
) -> Result<RegistrationResult> {
    Registration::new(config.clone()).run(
        reference.view(),
        moving.view(),
        mask.map(|m| m.view()),
        phi_init,
    )
}

/// Displacement and volume guards on a candidate operator.
fn check_geometry(phi: &Phi, centre: [f64; 3], margin: Margin, planar: bool) -> Option<Divergence> {
    let d = decompose(phi, centre, centre);

    let first_axis = if planar { 1 } else { 0 };
    let exceeds = (first_axis..3)
        .any(|a| d.translation[a].abs() > DIVERGENCE_MARGIN_FACTOR * margin.0[a] as f64);
    if exceeds {
        return Some(Divergence::DisplacementExceedsMargin);
    }

    if !(MIN_VOLUMETRIC_CHANGE..=MAX_VOLUMETRIC_CHANGE).contains(&d.volumetric_change) {
        return Some(Divergence::VolumetricChange);
    }

    None
}

/// Sum of squared differences over voxels finite in both images.
fn residual_error(reference: &ArrayView3<'_, f32>, warped: &ArrayView3<'_, f32>) -> f64 {
    Zip::from(reference)
        .and(warped)
        .fold(0.0f64, |acc, &r, &w| {
            if r.is_finite() && w.is_finite() {
                let d = (r - w) as f64;
                acc + d * d
            } else {
                acc
            }
        })
}
