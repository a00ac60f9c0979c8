pub mod analysis;
pub mod error;
pub mod linalg;
pub mod solvers;
pub mod system;
/// The `lyapunov_core` crate computes Lyapunov spectra of flows and maps.
///
/// Key components:
/// - **Traits**: `VectorField`/`JacobianField` (caller-supplied dynamics), `Steppable` (time
///   stepping of state and tangent bundle) and `DynamicalSystem` (the common system interface).
/// - **Solvers**: fixed-step RK4 for flows and `DiscreteMap` for maps.
/// - **System**: `System`, the owned state/time/dt bundle with `ContinuousSystem` and
///   `DiscreteSystem` variants.
/// - **Analysis**: maximal exponent, exponent spectrum, covariant Lyapunov vectors and
///   their adjoints.
pub mod traits;

pub use analysis::{
    adjoints, clv, clv_default_rng, covariant_exponents, lce, mlce, mlce_default_rng,
    AdjointBasis, AdjointMethod, ClvSettings, CovariantVectors,
    ExponentSettings, ExponentSpectrum, MaximalExponent,
};
pub use error::DynamicsError;
pub use system::{ContinuousSystem, DiscreteSystem, System};
pub use traits::{DynamicalSystem, JacobianField, Steppable, VectorField};
