//! Lyapunov exponents, covariant Lyapunov vectors and adjoints.

mod adjoint;
mod covariant;
mod exponents;

pub use adjoint::{adjoint_basis, adjoints, AdjointBasis, AdjointMethod};
pub use covariant::{clv, clv_default_rng, covariant_exponents, ClvSettings, CovariantVectors};
pub use exponents::{
    lce, mlce, mlce_default_rng, ExponentSettings, ExponentSpectrum, MaximalExponent,
};

use crate::traits::DynamicalSystem;
use anyhow::{bail, Result};

fn validate_system<S: DynamicalSystem>(system: &S) -> Result<()> {
    if system.dimension() == 0 {
        bail!("Initial state must have positive dimension.");
    }
    let dt = system.dt();
    if !(dt > 0.0) || !dt.is_finite() {
        bail!("Step size dt must be positive.");
    }
    Ok(())
}

fn validate_exponent_count(p: usize, dim: usize) -> Result<()> {
    if p == 0 {
        bail!("At least one exponent must be requested.");
    }
    if p > dim {
        bail!(
            "Cannot track {} tangent directions in a {}-dimensional system.",
            p,
            dim
        );
    }
    Ok(())
}
