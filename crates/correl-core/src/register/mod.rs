//! Single-operator registration: find the Phi that best maps a reference
//! image onto a moving image by Gauss-Newton iteration on the linearized
//! grayscale-conservation residual.

pub mod config;
pub mod multiscale;
pub mod operator;
pub mod result;
mod solver;

pub use config::{MultiscaleConfig, RegistrationConfig};
pub use multiscale::{nearest_power_of_two, register_multiscale, MultiscaleRegistration};
pub use operator::{create_assembler, CpuAssembler, NormalEquations, OperatorAssembler};
pub use result::{Divergence, RegistrationResult, Status};
pub use solver::{register, Registration};
