use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_DELTA_PHI_MIN, DEFAULT_MAX_ITERATIONS};
use crate::resample::Interpolation;
use crate::volume::Margin;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Padding removed from the reference image. `None` picks a margin that
    /// tolerates a 45 degree rotation.
    #[serde(default)]
    pub margin: Option<Margin>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Convergence threshold on the norm of the Phi correction.
    #[serde(default = "default_delta_phi_min")]
    pub delta_phi_min: f64,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Restrict Phi to rotation and translation.
    #[serde(default)]
    pub rigid: bool,
    /// Factor applied to the initial Phi's translation, for an initial
    /// estimate measured at a different binning.
    #[serde(default = "default_bin_ratio")]
    pub phi_init_bin_ratio: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            margin: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            delta_phi_min: DEFAULT_DELTA_PHI_MIN,
            interpolation: Interpolation::Linear,
            rigid: false,
            phi_init_bin_ratio: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiscaleConfig {
    /// Coarsest binning factor, rounded to the nearest power of two.
    #[serde(default = "default_max_binning")]
    pub max_binning: usize,
    #[serde(default)]
    pub registration: RegistrationConfig,
}

impl Default for MultiscaleConfig {
    fn default() -> Self {
        Self {
            max_binning: default_max_binning(),
            registration: RegistrationConfig::default(),
        }
    }
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_delta_phi_min() -> f64 {
    DEFAULT_DELTA_PHI_MIN
}

fn default_bin_ratio() -> f64 {
    1.0
}

fn default_max_binning() -> usize {
    4
}
