use crate::transform::Phi;

/// Heuristic that stopped a diverging iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Divergence {
    /// Error did not drop by 20% during the second half of the budget.
    ErrorGrowth,
    /// Translation exceeded five margins in some axis.
    DisplacementExceedsMargin,
    /// det(U) left `[0.2, 3.0]`.
    VolumetricChange,
}

/// Terminal state of a registration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Converged,
    MaxIterations,
    Diverging(Divergence),
    Singular,
}

impl Status {
    /// Numeric status: 2 converged, 1 budget exhausted, -1 error growth,
    /// -2 singular, -3 displacement or volume divergence.
    pub fn code(&self) -> i32 {
        match self {
            Self::Converged => 2,
            Self::MaxIterations => 1,
            Self::Diverging(Divergence::ErrorGrowth) => -1,
            Self::Singular => -2,
            Self::Diverging(_) => -3,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::MaxIterations => write!(f, "max iterations reached"),
            Self::Diverging(Divergence::ErrorGrowth) => write!(f, "diverging (error growth)"),
            Self::Diverging(Divergence::DisplacementExceedsMargin) => {
                write!(f, "diverging (displacement exceeds margin)")
            }
            Self::Diverging(Divergence::VolumetricChange) => {
                write!(f, "diverging (volumetric change)")
            }
            Self::Singular => write!(f, "singular"),
        }
    }
}

/// Outcome of a registration, produced for every run that passes input
/// validation.
#[derive(Clone, Debug)]
pub struct RegistrationResult {
    /// Best operator found. For divergent or singular runs this is the Phi
    /// before the update that triggered the stop.
    pub phi: Phi,
    /// Point `(z, y, x)` of the reference image about which `phi` acts: the
    /// image centre, or the centroid of the unmasked voxels.
    pub phi_centre: [f64; 3],
    /// Residual sum of squares normalised by the reference intensity sum.
    pub error: f64,
    pub status: Status,
    pub iterations: usize,
    /// Norm of the last computed correction; infinite if none was solved.
    pub delta_phi_norm: f64,
}
