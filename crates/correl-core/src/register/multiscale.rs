//! Coarse-to-fine registration on a binning pyramid.
//!
//! Both images are binned by `B, B/2, ..., 1` and registered from coarsest to
//! finest. Each level is seeded with the previous level's Phi, its translation
//! doubled to account for the doubled resolution. This avoids converging on
//! fine-scale texture and reduces the cost on large images.

use ndarray::ArrayView3;
use tracing::{info, warn};

use crate::cancel::{self, CancelToken};
use crate::error::{CorrelError, Result};
use crate::transform::Phi;
use crate::volume::{bin, bin_mask, centre, is_planar, shape_of, Margin, Mask, Volume};

use super::config::{MultiscaleConfig, RegistrationConfig};
use super::result::RegistrationResult;
use super::solver::Registration;

/// Round to the nearest power of two (ties round up). Zero is rejected.
pub fn nearest_power_of_two(factor: usize) -> Result<usize> {
    if factor == 0 {
        return Err(CorrelError::InvalidParameter(
            "binning factor must be at least 1".into(),
        ));
    }
    if factor.is_power_of_two() {
        return Ok(factor);
    }
    let lower = 1usize << (usize::BITS - 1 - factor.leading_zeros());
    let upper = lower << 1;
    Ok(if factor - lower < upper - factor {
        lower
    } else {
        upper
    })
}

/// Pyramid driver around [`Registration`].
pub struct MultiscaleRegistration {
    config: MultiscaleConfig,
    cancel: Option<CancelToken>,
}

impl MultiscaleRegistration {
    pub fn new(config: MultiscaleConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run every level and return the finest level's result.
    pub fn run(
        &self,
        reference: ArrayView3<'_, f32>,
        moving: ArrayView3<'_, f32>,
        mask: Option<ArrayView3<'_, bool>>,
        phi_init: Option<&Phi>,
    ) -> Result<RegistrationResult> {
        let max_binning = nearest_power_of_two(self.config.max_binning)?;
        if max_binning != self.config.max_binning {
            warn!(
                requested = self.config.max_binning,
                used = max_binning,
                "binning rounded to a power of two"
            );
        }

        let base = &self.config.registration;
        let shape1 = shape_of(&reference);
        let base_margin = base
            .margin
            .unwrap_or_else(|| Margin::auto(shape1))
            .for_shape(shape1);

        let mut phi = phi_init.copied().unwrap_or_default();
        let mut ratio = base.phi_init_bin_ratio / max_binning as f64;
        let mut level = max_binning;

        loop {
            cancel::check(self.cancel.as_ref())?;

            let level_config = RegistrationConfig {
                margin: Some(base_margin.scaled_down(level)),
                phi_init_bin_ratio: ratio,
                ..base.clone()
            };
            let mut registration = Registration::new(level_config);
            if let Some(token) = &self.cancel {
                registration = registration.with_cancel_token(token.clone());
            }

            let result = if level == 1 {
                registration.run(reference, moving, mask, Some(&phi))?
            } else {
                let (ref_binned, mov_binned, mask_binned) =
                    bin_level(reference, moving, mask, level)?;
                registration.run(
                    ref_binned.view(),
                    mov_binned.view(),
                    mask_binned.as_ref().map(|m| m.view()),
                    Some(&phi),
                )?
            };

            info!(
                level,
                status = %result.status,
                iterations = result.iterations,
                error = result.error,
                "pyramid level finished"
            );

            if level == 1 {
                return Ok(result);
            }

            // Seed the next level with Phi about this level's image centre.
            let level_shape = binned_shape(shape1, level);
            phi = result.phi.recentred(result.phi_centre, centre(level_shape));
            ratio = 2.0;
            level /= 2;
        }
    }
}

/// Register on a binning pyramid with the default collaborators.
pub fn register_multiscale(
    reference: &Volume,
    moving: &Volume,
    mask: Option<&Mask>,
    phi_init: Option<&Phi>,
    config: &MultiscaleConfig,
) -> Result<RegistrationResult> {
    MultiscaleRegistration::new(config.clone()).run(
        reference.view(),
        moving.view(),
        mask.map(|m| m.view()),
        phi_init,
    )
}

fn bin_level(
    reference: ArrayView3<'_, f32>,
    moving: ArrayView3<'_, f32>,
    mask: Option<ArrayView3<'_, bool>>,
    level: usize,
) -> Result<(Volume, Volume, Option<Mask>)> {
    let ref_binned = bin(&reference, level)?;
    let mov_binned = bin(&moving, level)?;
    let mask_binned = mask.map(|m| bin_mask(&m, level)).transpose()?;
    Ok((ref_binned, mov_binned, mask_binned))
}

fn binned_shape(shape: [usize; 3], level: usize) -> [usize; 3] {
    if is_planar(shape) {
        [1, shape[1] / level, shape[2] / level]
    } else {
        shape.map(|n| n / level)
    }
}
